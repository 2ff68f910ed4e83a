use thiserror::Error;

use crate::metadata::MetadataError;

#[derive(Debug, Error)]
pub enum BindingError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("no model binder can bind `{model_name}` of type `{type_name}`")]
    BinderNotFound {
        model_name: String,
        type_name: String,
    },
    #[error("model binding exceeded the maximum depth of {max_depth} at `{model_name}`")]
    MaxDepthExceeded { model_name: String, max_depth: usize },
    #[error("model of type `{type_name}` does not round-trip through JSON: {source}")]
    Serialization {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BindingError {
    pub fn binder_not_found(model_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::BinderNotFound {
            model_name: model_name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn serialization(type_name: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            type_name: type_name.into(),
            source,
        }
    }

    /// Binder-not-found is reported as a failed bind; every other error is fatal.
    pub fn is_binder_not_found(&self) -> bool {
        matches!(self, Self::BinderNotFound { .. })
    }
}
