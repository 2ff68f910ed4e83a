//! Recursive model binders.
//!
//! Each binder either claims a node (`Ok(Some(..))`) or declines it
//! (`Ok(None)`) so the composite can try the next one. Binders recurse into
//! child nodes through [`OperationBindingContext::binder`], which keeps the
//! whole tree going through the same ordered chain.

mod body;
mod collection;
mod complex;
mod dictionary;
mod header;
mod simple;

use futures::future::BoxFuture;
use tracing::trace;

use crate::metadata::{BinderMarker, BindingSource};

use super::context::{ModelBindingContext, ModelBindingResult, OperationBindingContext};
use super::error::BindingError;
use super::model_state::ModelStateDictionary;

pub use body::BodyModelBinder;
pub use collection::CollectionModelBinder;
pub use complex::ComplexObjectModelBinder;
pub use dictionary::DictionaryModelBinder;
pub use header::HeaderModelBinder;
pub use simple::SimpleTypeModelBinder;

pub type BindFuture<'a> = BoxFuture<'a, Result<Option<ModelBindingResult>, BindingError>>;

pub trait ModelBinder: Send + Sync {
    fn bind_model<'a>(
        &'a self,
        context: &'a ModelBindingContext,
        operation: &'a OperationBindingContext<'a>,
        model_state: &'a mut ModelStateDictionary,
    ) -> BindFuture<'a>;
}

/// Ordered binder chain; the first binder that claims a node wins.
pub struct CompositeModelBinder {
    binders: Vec<Box<dyn ModelBinder>>,
}

impl Default for CompositeModelBinder {
    fn default() -> Self {
        Self::new(vec![
            Box::new(BodyModelBinder),
            Box::new(HeaderModelBinder),
            Box::new(SimpleTypeModelBinder),
            Box::new(CollectionModelBinder),
            Box::new(DictionaryModelBinder),
            Box::new(ComplexObjectModelBinder),
        ])
    }
}

impl CompositeModelBinder {
    pub fn new(binders: Vec<Box<dyn ModelBinder>>) -> Self {
        Self { binders }
    }

    /// Bind a node, failing with `BinderNotFound` if no binder claims it.
    pub async fn bind(
        &self,
        context: &ModelBindingContext,
        operation: &OperationBindingContext<'_>,
        model_state: &mut ModelStateDictionary,
    ) -> Result<ModelBindingResult, BindingError> {
        let result = self.bind_model(context, operation, model_state).await?;
        Ok(result.unwrap_or(ModelBindingResult::NotBound))
    }
}

impl ModelBinder for CompositeModelBinder {
    fn bind_model<'a>(
        &'a self,
        context: &'a ModelBindingContext,
        operation: &'a OperationBindingContext<'a>,
        model_state: &'a mut ModelStateDictionary,
    ) -> BindFuture<'a> {
        Box::pin(async move {
            let max_depth = operation.options.max_depth;
            if context.depth > max_depth {
                return Err(BindingError::MaxDepthExceeded {
                    model_name: context.model_name.clone(),
                    max_depth,
                });
            }

            for binder in &self.binders {
                if let Some(result) = binder
                    .bind_model(context, operation, &mut *model_state)
                    .await?
                {
                    trace!(
                        model_name = %context.model_name,
                        model_type = context.metadata.full_name(),
                        bound = matches!(result, ModelBindingResult::Bound(_)),
                        "Model node bound"
                    );
                    return Ok(Some(result));
                }
            }

            Err(BindingError::binder_not_found(
                &context.model_name,
                context.metadata.full_name(),
            ))
        })
    }
}

/// Body and header markers are served by their dedicated binders only.
fn reads_from_providers(marker: Option<&BinderMarker>) -> bool {
    !matches!(
        marker.and_then(BinderMarker::source),
        Some(BindingSource::Body | BindingSource::Header)
    )
}
