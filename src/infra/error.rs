use thiserror::Error;

use crate::compilation::ManifestError;
use crate::config::LoadError;
use crate::validation::ActivationError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
