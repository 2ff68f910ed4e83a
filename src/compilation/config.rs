use crate::config::CompilationSettings;

use super::view_start::DEFAULT_VIEW_START_FILE_NAME;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerCacheConfig {
    /// File name looked up in each ancestor directory of a view.
    pub view_start_file_name: String,
}

impl Default for CompilerCacheConfig {
    fn default() -> Self {
        Self {
            view_start_file_name: DEFAULT_VIEW_START_FILE_NAME.to_string(),
        }
    }
}

impl From<&CompilationSettings> for CompilerCacheConfig {
    fn from(settings: &CompilationSettings) -> Self {
        Self {
            view_start_file_name: settings.view_start_file_name.clone(),
        }
    }
}
