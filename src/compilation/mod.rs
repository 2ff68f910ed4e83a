//! Cache of compiled views with view-start aware invalidation.

mod cache;
mod config;
mod file_system;
mod hash;
mod lock;
mod manifest;
mod razor_file_info;
mod result;
mod view_start;

pub use cache::{CompilerCache, CompilerCacheEntry};
pub use config::CompilerCacheConfig;
pub use file_system::{FileInfo, FileSystem, PhysicalFileSystem, RelativeFileInfo};
pub use hash::{hash_bytes, hash_file, hash_stream};
pub use manifest::{ManifestError, PrecompiledManifest};
pub use razor_file_info::RazorFileInfo;
pub use result::{CompilationResult, CompiledType};
pub use view_start::{DEFAULT_VIEW_START_FILE_NAME, normalize_path, view_start_locations};
