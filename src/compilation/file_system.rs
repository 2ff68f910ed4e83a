//! File access used to look up views and their view-start dependencies.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

pub trait FileInfo: Send + Sync {
    fn length(&self) -> u64;

    fn last_modified(&self) -> OffsetDateTime;

    fn physical_path(&self) -> Option<&Path> {
        None
    }

    fn create_read_stream(&self) -> io::Result<Box<dyn Read + Send>>;
}

pub trait FileSystem: Send + Sync {
    /// `None` when nothing exists at `path` or it is not a regular file.
    fn try_get_file_info(&self, path: &str) -> Option<Arc<dyn FileInfo>>;
}

/// A file under the application root, paired with its root-relative path.
#[derive(Clone)]
pub struct RelativeFileInfo {
    file: Arc<dyn FileInfo>,
    relative_path: String,
}

impl fmt::Debug for RelativeFileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelativeFileInfo")
            .field("relative_path", &self.relative_path)
            .field("length", &self.file.length())
            .finish()
    }
}

impl RelativeFileInfo {
    pub fn new(file: Arc<dyn FileInfo>, relative_path: impl Into<String>) -> Self {
        Self {
            file,
            relative_path: relative_path.into(),
        }
    }

    pub fn file_info(&self) -> &Arc<dyn FileInfo> {
        &self.file
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }
}

/// Files on disk below a root directory.
#[derive(Debug, Clone)]
pub struct PhysicalFileSystem {
    root: PathBuf,
}

impl PhysicalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a `/`-separated relative path below the root. Paths that climb
    /// out of the root are rejected.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches(['/', '\\']));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => resolved.push(segment),
                Component::CurDir => {}
                _ => return None,
            }
        }
        (resolved != self.root).then_some(resolved)
    }
}

impl FileSystem for PhysicalFileSystem {
    fn try_get_file_info(&self, path: &str) -> Option<Arc<dyn FileInfo>> {
        let resolved = self.resolve(&path.replace('\\', "/"))?;
        let metadata = match fs::metadata(&resolved) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return None,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    debug!(path, error = %err, "File lookup failed");
                }
                return None;
            }
        };
        let last_modified = metadata
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Some(Arc::new(PhysicalFileInfo {
            path: resolved,
            length: metadata.len(),
            last_modified,
        }))
    }
}

#[derive(Debug)]
struct PhysicalFileInfo {
    path: PathBuf,
    length: u64,
    last_modified: OffsetDateTime,
}

impl FileInfo for PhysicalFileInfo {
    fn length(&self) -> u64 {
        self.length
    }

    fn last_modified(&self) -> OffsetDateTime {
        self.last_modified
    }

    fn physical_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn create_read_stream(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(&self.path)?))
    }
}
