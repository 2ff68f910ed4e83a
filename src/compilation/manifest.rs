//! Startup list of precompiled views.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::info;

use super::razor_file_info::RazorFileInfo;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read precompiled manifest `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid precompiled manifest: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecompiledManifest {
    #[serde(default)]
    pub files: Vec<RazorFileInfo>,
}

impl PrecompiledManifest {
    pub fn new(files: Vec<RazorFileInfo>) -> Self {
        Self { files }
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: &Path) -> Result<Self, ManifestError> {
        let json = fs::read_to_string(path)
            .await
            .map_err(|source| ManifestError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let manifest = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            files = manifest.files.len(),
            "Precompiled manifest loaded"
        );
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
