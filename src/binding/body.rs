//! Request body readers used for body-marked nodes.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::metadata::{ModelKind, ModelMetadata};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BodyReadError {
    #[error("unsupported content type `{0}`")]
    UnsupportedMediaType(String),
    #[error("malformed request body: {0}")]
    Malformed(String),
}

/// Reads a whole model from the request body in one step.
#[async_trait]
pub trait BodyModelReader: Send + Sync {
    /// `Ok(None)` when the request has no body.
    async fn read(&self, metadata: &ModelMetadata) -> Result<Option<Value>, BodyReadError>;
}

/// JSON reader over a buffered body.
#[derive(Debug, Clone)]
pub struct JsonBodyReader {
    body: Bytes,
    content_type: Option<String>,
}

impl JsonBodyReader {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn check_content_type(&self) -> Result<(), BodyReadError> {
        let Some(content_type) = self.content_type.as_deref() else {
            return Ok(());
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            Ok(())
        } else {
            Err(BodyReadError::UnsupportedMediaType(content_type.to_string()))
        }
    }
}

#[async_trait]
impl BodyModelReader for JsonBodyReader {
    async fn read(&self, metadata: &ModelMetadata) -> Result<Option<Value>, BodyReadError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        self.check_content_type()?;

        let value: Value = serde_json::from_slice(&self.body)
            .map_err(|err| BodyReadError::Malformed(err.to_string()))?;

        let shape_matches = match (metadata.kind(), &value) {
            (_, Value::Null) => true,
            (ModelKind::Complex | ModelKind::Dictionary { .. }, value) => value.is_object(),
            (ModelKind::Collection { .. }, value) => value.is_array(),
            (ModelKind::Scalar(_), value) => !value.is_object() && !value.is_array(),
            (ModelKind::Opaque, _) => false,
        };
        if !shape_matches {
            return Err(BodyReadError::Malformed(format!(
                "body does not describe a `{}`",
                metadata.full_name()
            )));
        }
        Ok(Some(value))
    }
}
