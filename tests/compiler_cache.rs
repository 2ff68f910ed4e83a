use std::collections::HashMap;
use std::convert::Infallible;
use std::fs;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use mvcore::compilation::{
    CompilationResult, CompiledType, CompilerCache, CompilerCacheConfig, FileInfo, FileSystem,
    PhysicalFileSystem, PrecompiledManifest, RazorFileInfo, RelativeFileInfo, hash_bytes,
};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const T0: OffsetDateTime = datetime!(2024-05-01 10:00:00 UTC);
const INDEX: &str = "/Views/Home/Index.cshtml";
const ROOT_VIEW_START: &str = "/_ViewStart.cshtml";
const VIEWS_VIEW_START: &str = "/Views/_ViewStart.cshtml";

#[derive(Debug, Clone)]
struct MemoryFile {
    content: String,
    last_modified: OffsetDateTime,
}

impl MemoryFile {
    fn new(content: &str, last_modified: OffsetDateTime) -> Self {
        Self {
            content: content.to_string(),
            last_modified,
        }
    }
}

impl FileInfo for MemoryFile {
    fn length(&self) -> u64 {
        self.content.len() as u64
    }

    fn last_modified(&self) -> OffsetDateTime {
        self.last_modified
    }

    fn create_read_stream(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::Cursor::new(self.content.clone().into_bytes())))
    }
}

/// File system whose contents change between lookups.
#[derive(Default)]
struct MemoryFileSystem {
    files: Mutex<HashMap<String, MemoryFile>>,
}

impl MemoryFileSystem {
    fn put(&self, path: &str, content: &str, last_modified: OffsetDateTime) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_lowercase(), MemoryFile::new(content, last_modified));
    }

    fn delete(&self, path: &str) {
        self.files
            .lock()
            .expect("files lock")
            .remove(&path.to_lowercase());
    }

    fn view(&self, path: &str) -> RelativeFileInfo {
        let file = self.files.lock().expect("files lock")[&path.to_lowercase()].clone();
        RelativeFileInfo::new(Arc::new(file), path)
    }
}

impl FileSystem for MemoryFileSystem {
    fn try_get_file_info(&self, path: &str) -> Option<Arc<dyn FileInfo>> {
        self.files
            .lock()
            .expect("files lock")
            .get(&path.to_lowercase())
            .map(|file| Arc::new(file.clone()) as Arc<dyn FileInfo>)
    }
}

fn record(path: &str, content: &str, last_modified: OffsetDateTime) -> RazorFileInfo {
    RazorFileInfo {
        full_type_name: format!("Precompiled{}", path.replace(['/', '.'], "_")),
        hash: hash_bytes(content.as_bytes()),
        last_modified,
        length: content.len() as u64,
        relative_path: path.to_string(),
    }
}

fn compiled(name: &'static str) -> impl FnOnce() -> Result<CompilationResult, Infallible> {
    move || Ok(CompilationResult::successful(CompiledType::new(name)))
}

fn must_not_compile() -> Result<CompilationResult, Infallible> {
    panic!("compile function invoked on a cache hit")
}

fn type_name(result: &CompilationResult) -> String {
    result
        .compiled_type()
        .expect("successful compilation")
        .full_name()
        .to_string()
}

#[test]
fn added_entry_is_returned_without_compiling() {
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    let cache = CompilerCache::default();
    cache.add(&record(INDEX, "<h1>home</h1>", T0), CompiledType::new("Views.Home.Index"));

    let result = cache
        .get_or_add(&fs.view(INDEX), &fs, must_not_compile)
        .expect("cache hit");

    assert_eq!(type_name(&result), "Views.Home.Index");
}

#[test]
fn unchanged_file_compiles_once() {
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    fs.put(ROOT_VIEW_START, "@{ Layout = \"_Layout\"; }", T0);
    let cache = CompilerCache::default();

    let first = cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("Runtime.Index"))
        .expect("compiled");
    let second = cache
        .get_or_add(&fs.view(INDEX), &fs, must_not_compile)
        .expect("cache hit");

    assert_eq!(type_name(&first), "Runtime.Index");
    assert_eq!(type_name(&second), "Runtime.Index");
}

#[test]
fn same_length_edit_with_new_timestamp_recompiles() {
    let fs = MemoryFileSystem::default();
    fs.put("ab", "hello", T0);
    let cache = CompilerCache::default();
    cache.add(&record("ab", "hello", T0), CompiledType::new("H1"));

    let hit = cache
        .get_or_add(&fs.view("ab"), &fs, must_not_compile)
        .expect("cache hit");
    assert_eq!(type_name(&hit), "H1");

    fs.put("ab", "HELLO", T0 + Duration::minutes(5));
    let recompiled = cache
        .get_or_add(&fs.view("ab"), &fs, compiled("H2"))
        .expect("recompiled");
    assert_eq!(type_name(&recompiled), "H2");

    let cached = cache
        .get_or_add(&fs.view("ab"), &fs, must_not_compile)
        .expect("new entry hit");
    assert_eq!(type_name(&cached), "H2");
}

#[test]
fn length_mismatch_recompiles_despite_matching_timestamp() {
    let fs = MemoryFileSystem::default();
    fs.put("ab", "hello, world", T0);
    let cache = CompilerCache::default();
    cache.add(&record("ab", "hello", T0), CompiledType::new("H1"));

    let result = cache
        .get_or_add(&fs.view("ab"), &fs, compiled("H2"))
        .expect("recompiled");

    assert_eq!(type_name(&result), "H2");
}

#[test]
fn precompiled_view_recompiles_when_view_start_is_added() {
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    let cache = CompilerCache::default();
    cache.add(&record(INDEX, "<h1>home</h1>", T0), CompiledType::new("Precompiled"));

    fs.put(VIEWS_VIEW_START, "@{ Layout = \"_Layout\"; }", T0);
    let result = cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("Runtime"))
        .expect("recompiled");

    assert_eq!(type_name(&result), "Runtime");
}

#[test]
fn precompiled_view_recompiles_when_view_start_is_deleted() {
    let view_start = "@{ Layout = \"_Layout\"; }";
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    let cache = CompilerCache::default();
    cache.add(&record(VIEWS_VIEW_START, view_start, T0), CompiledType::new("ViewStart"));
    cache.add(&record(INDEX, "<h1>home</h1>", T0), CompiledType::new("Precompiled"));

    let result = cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("Runtime"))
        .expect("recompiled");

    assert_eq!(type_name(&result), "Runtime");
}

#[test]
fn precompiled_view_stays_valid_with_matching_view_start() {
    let view_start = "@{ Layout = \"_Layout\"; }";
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    fs.put(VIEWS_VIEW_START, view_start, T0 + Duration::days(1));
    let cache = CompilerCache::default();
    cache.add(&record(VIEWS_VIEW_START, view_start, T0), CompiledType::new("ViewStart"));
    cache.add(&record(INDEX, "<h1>home</h1>", T0), CompiledType::new("Precompiled"));

    let result = cache
        .get_or_add(&fs.view(INDEX), &fs, must_not_compile)
        .expect("cache hit");

    assert_eq!(type_name(&result), "Precompiled");
}

#[test]
fn precompiled_view_recompiles_when_view_start_content_changes() {
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    fs.put(VIEWS_VIEW_START, "@{ Layout = \"_Other\"; }", T0 + Duration::days(1));
    let cache = CompilerCache::default();
    cache.add(
        &record(VIEWS_VIEW_START, "@{ Layout = \"_Layout\"; }", T0),
        CompiledType::new("ViewStart"),
    );
    cache.add(&record(INDEX, "<h1>home</h1>", T0), CompiledType::new("Precompiled"));

    let result = cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("Runtime"))
        .expect("recompiled");

    assert_eq!(type_name(&result), "Runtime");
}

#[test]
fn runtime_view_recompiles_when_any_view_start_changes() {
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    fs.put(ROOT_VIEW_START, "@{ Layout = \"_Layout\"; }", T0);
    let cache = CompilerCache::default();
    cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("First"))
        .expect("compiled");

    fs.put(VIEWS_VIEW_START, "@using App", T0);
    let added = cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("Second"))
        .expect("recompiled after add");
    assert_eq!(type_name(&added), "Second");

    fs.put(ROOT_VIEW_START, "@{ Layout = \"_Wide\"; }", T0 + Duration::seconds(1));
    let changed = cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("Third"))
        .expect("recompiled after change");
    assert_eq!(type_name(&changed), "Third");

    fs.delete(VIEWS_VIEW_START);
    let deleted = cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("Fourth"))
        .expect("recompiled after delete");
    assert_eq!(type_name(&deleted), "Fourth");
}

#[test]
fn touched_view_start_with_identical_content_is_still_valid() {
    let layout = "@{ Layout = \"_Layout\"; }";
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    fs.put(ROOT_VIEW_START, layout, T0);
    let cache = CompilerCache::default();
    cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("Runtime"))
        .expect("compiled");

    fs.put(ROOT_VIEW_START, layout, T0 + Duration::hours(2));
    let result = cache
        .get_or_add(&fs.view(INDEX), &fs, must_not_compile)
        .expect("cache hit");

    assert_eq!(type_name(&result), "Runtime");
}

#[test]
fn custom_view_start_file_name_is_honoured() {
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    let cache = CompilerCache::new(CompilerCacheConfig {
        view_start_file_name: "_Imports.cshtml".to_string(),
    });
    cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("First"))
        .expect("compiled");

    fs.put(VIEWS_VIEW_START, "@using App", T0);
    let ignored = cache
        .get_or_add(&fs.view(INDEX), &fs, must_not_compile)
        .expect("default name ignored");
    assert_eq!(type_name(&ignored), "First");

    fs.put("/Views/_Imports.cshtml", "@using App", T0);
    let recompiled = cache
        .get_or_add(&fs.view(INDEX), &fs, compiled("Second"))
        .expect("recompiled");
    assert_eq!(type_name(&recompiled), "Second");
}

#[test]
fn lookups_ignore_path_case_and_separators() {
    let fs = MemoryFileSystem::default();
    fs.put(INDEX, "<h1>home</h1>", T0);
    let cache = CompilerCache::default();
    cache.add(&record(INDEX, "<h1>home</h1>", T0), CompiledType::new("Precompiled"));

    let file = RelativeFileInfo::new(
        Arc::new(MemoryFile::new("<h1>home</h1>", T0)),
        r"views\home\INDEX.cshtml",
    );
    let result = cache
        .get_or_add(&file, &fs, must_not_compile)
        .expect("cache hit");

    assert_eq!(type_name(&result), "Precompiled");
}

#[tokio::test]
async fn manifest_and_physical_files_work_together() {
    let dir = tempfile::tempdir().expect("tempdir");
    let views = dir.path().join("Views/Home");
    fs::create_dir_all(&views).expect("mkdir");
    fs::write(views.join("Index.cshtml"), "<h1>home</h1>").expect("write view");
    let file_system = PhysicalFileSystem::new(dir.path());

    let info = file_system
        .try_get_file_info(INDEX)
        .expect("view exists");
    let view = RelativeFileInfo::new(info, INDEX);
    let captured = RazorFileInfo::capture(&view, "Views.Home.Index").expect("capture");
    let manifest_path = dir.path().join("manifest.json");
    fs::write(
        &manifest_path,
        serde_json::to_string(&PrecompiledManifest::new(vec![captured])).expect("serialize"),
    )
    .expect("write manifest");

    let manifest = PrecompiledManifest::load(&manifest_path).await.expect("load");
    let cache = CompilerCache::default();
    assert_eq!(cache.add_manifest(&manifest), 1);

    let hit = cache
        .get_or_add(&view, &file_system, must_not_compile)
        .expect("cache hit");
    assert_eq!(type_name(&hit), "Views.Home.Index");

    fs::write(views.join("Index.cshtml"), "<h1>home, edited</h1>").expect("rewrite view");
    let edited = RelativeFileInfo::new(
        file_system.try_get_file_info(INDEX).expect("view exists"),
        INDEX,
    );
    let recompiled = cache
        .get_or_add(&edited, &file_system, compiled("Runtime.Index"))
        .expect("recompiled");
    assert_eq!(type_name(&recompiled), "Runtime.Index");
}
