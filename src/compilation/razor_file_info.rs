use std::io;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::file_system::RelativeFileInfo;
use super::hash::hash_file;

/// Record describing a view compiled ahead of time.
///
/// Its length, timestamp and hash are the baseline the cache compares the
/// live file against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RazorFileInfo {
    #[serde(default)]
    pub full_type_name: String,
    pub hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    pub length: u64,
    pub relative_path: String,
}

impl RazorFileInfo {
    /// Capture the current state of `file`, hashing its content.
    pub fn capture(
        file: &RelativeFileInfo,
        full_type_name: impl Into<String>,
    ) -> io::Result<Self> {
        let info = file.file_info();
        Ok(Self {
            full_type_name: full_type_name.into(),
            hash: hash_file(info.as_ref())?,
            last_modified: info.last_modified(),
            length: info.length(),
            relative_path: file.relative_path().to_string(),
        })
    }
}
