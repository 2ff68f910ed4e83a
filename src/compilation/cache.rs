//! Compiled-view cache keyed by relative path.
//!
//! Entries are revalidated on every lookup:
//!
//! 1. A length change always makes the entry stale.
//! 2. The view-start files above the view must match the entry's baseline.
//!    Precompiled entries take it from the precompiled view-start records in
//!    the cache. Runtime entries snapshot the file system when compiled.
//!    A view start that appeared, disappeared or changed makes the entry
//!    stale.
//! 3. Equal timestamps are a hit. For precompiled entries a differing
//!    timestamp falls back to comparing content hashes.
//!
//! Stale entries are replaced by a fresh compile. Concurrent first compiles
//! of one path may both run; the last insert wins.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::config::CompilerCacheConfig;
use super::file_system::{FileInfo, FileSystem, RelativeFileInfo};
use super::hash::hash_file;
use super::lock::{rw_read, rw_write};
use super::manifest::PrecompiledManifest;
use super::razor_file_info::RazorFileInfo;
use super::result::{CompilationResult, CompiledType};
use super::view_start::{cache_key, normalize_path, view_start_locations};

const SOURCE: &str = "compilation::cache";

const METRIC_CACHE_HIT: &str = "mvcore_compiler_cache_hit_total";
const METRIC_CACHE_MISS: &str = "mvcore_compiler_cache_miss_total";
const METRIC_CACHE_RECOMPILE: &str = "mvcore_compiler_cache_recompile_total";
const METRIC_COMPILE_MS: &str = "mvcore_compile_ms";

type MetadataValue = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    length: u64,
    last_modified: OffsetDateTime,
    /// `None` when the content could not be read; only an identical
    /// timestamp then matches.
    hash: Option<String>,
}

impl FileStamp {
    fn capture(path: &str, file: &dyn FileInfo) -> Self {
        let hash = match hash_file(file) {
            Ok(hash) => Some(hash),
            Err(err) => {
                warn!(path, error = %err, "Failed to hash view start");
                None
            }
        };
        Self {
            length: file.length(),
            last_modified: file.last_modified(),
            hash,
        }
    }

    fn matches(&self, path: &str, file: &dyn FileInfo) -> bool {
        if file.length() != self.length {
            return false;
        }
        if file.last_modified() == self.last_modified {
            return true;
        }
        let Some(expected) = self.hash.as_deref() else {
            return false;
        };
        match hash_file(file) {
            Ok(actual) => actual == expected,
            Err(err) => {
                warn!(path, error = %err, "Failed to hash view start");
                false
            }
        }
    }
}

/// Expected state of one view-start location; `stamp` is `None` when no
/// file was there.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewStartSnapshot {
    path: String,
    stamp: Option<FileStamp>,
}

impl ViewStartSnapshot {
    fn is_current(&self, file_system: &dyn FileSystem) -> bool {
        let current = file_system.try_get_file_info(&self.path);
        match (&self.stamp, current) {
            (None, None) => true,
            (Some(stamp), Some(file)) => stamp.matches(&self.path, file.as_ref()),
            _ => false,
        }
    }
}

#[derive(Debug)]
enum EntryKind {
    Precompiled { hash: String },
    RuntimeCompiled { view_starts: Vec<ViewStartSnapshot> },
}

pub struct CompilerCacheEntry {
    relative_path: String,
    compiled_type: CompiledType,
    length: u64,
    last_modified: RwLock<OffsetDateTime>,
    kind: EntryKind,
    metadata: RwLock<HashMap<String, MetadataValue>>,
}

impl fmt::Debug for CompilerCacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerCacheEntry")
            .field("relative_path", &self.relative_path)
            .field("compiled_type", &self.compiled_type)
            .field("length", &self.length)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl CompilerCacheEntry {
    fn precompiled(info: &RazorFileInfo, compiled_type: CompiledType) -> Self {
        Self {
            relative_path: normalize_path(&info.relative_path),
            compiled_type,
            length: info.length,
            last_modified: RwLock::new(info.last_modified),
            kind: EntryKind::Precompiled {
                hash: info.hash.clone(),
            },
            metadata: RwLock::new(HashMap::new()),
        }
    }

    fn runtime_compiled(
        file: &RelativeFileInfo,
        compiled_type: CompiledType,
        view_starts: Vec<ViewStartSnapshot>,
    ) -> Self {
        let info = file.file_info();
        Self {
            relative_path: normalize_path(file.relative_path()),
            compiled_type,
            length: info.length(),
            last_modified: RwLock::new(info.last_modified()),
            kind: EntryKind::RuntimeCompiled { view_starts },
            metadata: RwLock::new(HashMap::new()),
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn compiled_type(&self) -> &CompiledType {
        &self.compiled_type
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn last_modified(&self) -> OffsetDateTime {
        *rw_read(&self.last_modified, SOURCE, "last_modified")
    }

    pub fn is_precompiled(&self) -> bool {
        matches!(self.kind, EntryKind::Precompiled { .. })
    }

    /// Baseline from a precompiled record: the stored timestamp and hash.
    fn precompiled_stamp(&self) -> Option<FileStamp> {
        match &self.kind {
            EntryKind::Precompiled { hash } => Some(FileStamp {
                length: self.length,
                last_modified: self.last_modified(),
                hash: Some(hash.clone()),
            }),
            EntryKind::RuntimeCompiled { .. } => None,
        }
    }

    fn metadata_value<V>(&self, key: &str) -> Option<Arc<V>>
    where
        V: Any + Send + Sync,
    {
        let metadata = rw_read(&self.metadata, SOURCE, "metadata_value");
        metadata
            .get(key)
            .and_then(|value| Arc::clone(value).downcast::<V>().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Staleness {
    LengthChanged,
    ViewStartChanged,
    ContentChanged,
}

impl Staleness {
    fn as_str(self) -> &'static str {
        match self {
            Self::LengthChanged => "length_changed",
            Self::ViewStartChanged => "view_start_changed",
            Self::ContentChanged => "content_changed",
        }
    }
}

/// Caches compiled views for the lifetime of the process.
#[derive(Debug, Default)]
pub struct CompilerCache {
    entries: DashMap<String, Arc<CompilerCacheEntry>>,
    config: CompilerCacheConfig,
}

impl CompilerCache {
    pub fn new(config: CompilerCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CompilerCacheConfig {
        &self.config
    }

    /// Seed a precompiled entry without any freshness check, replacing
    /// whatever is cached for the path.
    pub fn add(&self, info: &RazorFileInfo, compiled_type: CompiledType) {
        let entry = CompilerCacheEntry::precompiled(info, compiled_type);
        debug!(
            relative_path = %entry.relative_path,
            compiled_type = %entry.compiled_type,
            "Precompiled view added"
        );
        self.entries
            .insert(cache_key(&info.relative_path), Arc::new(entry));
    }

    /// Seed every record of `manifest`; the first record for a path wins.
    /// Returns the number of entries added.
    pub fn add_manifest(&self, manifest: &PrecompiledManifest) -> usize {
        let mut added = 0;
        for info in &manifest.files {
            match self.entries.entry(cache_key(&info.relative_path)) {
                Entry::Occupied(_) => {
                    debug!(
                        relative_path = %info.relative_path,
                        "Duplicate precompiled record ignored"
                    );
                }
                Entry::Vacant(slot) => {
                    let compiled_type = CompiledType::new(info.full_type_name.as_str());
                    slot.insert(Arc::new(CompilerCacheEntry::precompiled(info, compiled_type)));
                    added += 1;
                }
            }
        }
        info!(
            records = manifest.len(),
            added,
            "Precompiled views registered"
        );
        added
    }

    /// Return the cached compilation for `file` when it is still fresh,
    /// otherwise compile it with `compile` and cache the result.
    ///
    /// The result of a fresh compile is returned as produced, generated
    /// content included; later hits carry only the compiled type. Failed
    /// results and errors from `compile` are passed through and not cached.
    pub fn get_or_add<F, E>(
        &self,
        file: &RelativeFileInfo,
        file_system: &dyn FileSystem,
        compile: F,
    ) -> Result<CompilationResult, E>
    where
        F: FnOnce() -> Result<CompilationResult, E>,
    {
        let key = cache_key(file.relative_path());
        let Some(entry) = self.lookup(&key) else {
            counter!(METRIC_CACHE_MISS).increment(1);
            debug!(relative_path = file.relative_path(), "Compiler cache miss");
            return self.compile_and_store(key, file, file_system, compile);
        };

        match self.check(&entry, file, file_system) {
            None => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Ok(CompilationResult::successful(entry.compiled_type.clone()))
            }
            Some(reason) => {
                counter!(METRIC_CACHE_RECOMPILE, "reason" => reason.as_str()).increment(1);
                debug!(
                    relative_path = file.relative_path(),
                    reason = reason.as_str(),
                    "Compiler cache entry is stale"
                );
                self.entries
                    .remove_if(&key, |_, current| Arc::ptr_eq(current, &entry));
                self.compile_and_store(key, file, file_system, compile)
            }
        }
    }

    /// Metadata attached to the cached entry for `file`.
    ///
    /// Values live and die with the entry: when the entry is missing or
    /// stale the factory result is returned without being stored.
    pub fn get_or_add_metadata<V, F>(
        &self,
        file: &RelativeFileInfo,
        file_system: &dyn FileSystem,
        key: &str,
        value_factory: F,
    ) -> Arc<V>
    where
        V: Any + Send + Sync,
        F: FnOnce() -> V,
    {
        let Some(entry) = self.lookup(&cache_key(file.relative_path())) else {
            return Arc::new(value_factory());
        };
        if let Some(reason) = self.check(&entry, file, file_system) {
            debug!(
                relative_path = file.relative_path(),
                reason = reason.as_str(),
                key,
                "Metadata requested for stale entry"
            );
            return Arc::new(value_factory());
        }

        if let Some(value) = entry.metadata_value::<V>(key) {
            return value;
        }
        let mut metadata = rw_write(&entry.metadata, SOURCE, "get_or_add_metadata");
        if let Some(value) = metadata
            .get(key)
            .and_then(|value| Arc::clone(value).downcast::<V>().ok())
        {
            return value;
        }
        let value = Arc::new(value_factory());
        metadata.insert(key.to_string(), Arc::clone(&value) as MetadataValue);
        value
    }

    /// Drop the entry for `relative_path`. Returns whether one existed.
    pub fn invalidate(&self, relative_path: &str) -> bool {
        self.entries.remove(&cache_key(relative_path)).is_some()
    }

    pub fn entry(&self, relative_path: &str) -> Option<Arc<CompilerCacheEntry>> {
        self.lookup(&cache_key(relative_path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<Arc<CompilerCacheEntry>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// `None` when the entry is still fresh.
    fn check(
        &self,
        entry: &CompilerCacheEntry,
        file: &RelativeFileInfo,
        file_system: &dyn FileSystem,
    ) -> Option<Staleness> {
        let info = file.file_info();
        if info.length() != entry.length {
            return Some(Staleness::LengthChanged);
        }

        let view_starts = match &entry.kind {
            EntryKind::RuntimeCompiled { view_starts } => Cow::Borrowed(view_starts.as_slice()),
            EntryKind::Precompiled { .. } => {
                Cow::Owned(self.precompiled_view_starts(&entry.relative_path))
            }
        };
        if !view_starts
            .iter()
            .all(|snapshot| snapshot.is_current(file_system))
        {
            return Some(Staleness::ViewStartChanged);
        }

        let last_modified = info.last_modified();
        if entry.last_modified() == last_modified {
            return None;
        }
        if let EntryKind::Precompiled { hash } = &entry.kind {
            match hash_file(info.as_ref()) {
                Ok(current) if current == *hash => {
                    *rw_write(&entry.last_modified, SOURCE, "touch") = last_modified;
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        relative_path = file.relative_path(),
                        error = %err,
                        "Failed to hash view"
                    );
                }
            }
        }
        Some(Staleness::ContentChanged)
    }

    /// Precompiled views were built against the precompiled view starts, so
    /// those records are the expected state.
    fn precompiled_view_starts(&self, relative_path: &str) -> Vec<ViewStartSnapshot> {
        view_start_locations(relative_path, &self.config.view_start_file_name)
            .into_iter()
            .map(|path| {
                let stamp = self
                    .lookup(&cache_key(&path))
                    .and_then(|entry| entry.precompiled_stamp());
                ViewStartSnapshot { path, stamp }
            })
            .collect()
    }

    fn snapshot_view_starts(
        &self,
        relative_path: &str,
        file_system: &dyn FileSystem,
    ) -> Vec<ViewStartSnapshot> {
        view_start_locations(relative_path, &self.config.view_start_file_name)
            .into_iter()
            .map(|path| {
                let stamp = file_system
                    .try_get_file_info(&path)
                    .map(|file| FileStamp::capture(&path, file.as_ref()));
                ViewStartSnapshot { path, stamp }
            })
            .collect()
    }

    fn compile_and_store<F, E>(
        &self,
        key: String,
        file: &RelativeFileInfo,
        file_system: &dyn FileSystem,
        compile: F,
    ) -> Result<CompilationResult, E>
    where
        F: FnOnce() -> Result<CompilationResult, E>,
    {
        let started_at = Instant::now();
        let result = compile()?;
        histogram!(METRIC_COMPILE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        let Some(compiled_type) = result.compiled_type().cloned() else {
            warn!(
                relative_path = file.relative_path(),
                diagnostics = result.messages().len(),
                "View compilation failed"
            );
            return Ok(result);
        };

        let view_starts = self.snapshot_view_starts(file.relative_path(), file_system);
        let entry = CompilerCacheEntry::runtime_compiled(file, compiled_type, view_starts);
        debug!(
            relative_path = file.relative_path(),
            compiled_type = %entry.compiled_type,
            "View compiled and cached"
        );
        self.entries.insert(key, Arc::new(entry));
        Ok(result)
    }
}
