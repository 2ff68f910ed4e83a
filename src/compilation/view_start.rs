//! View-start discovery.
//!
//! A view inherits directives from every view-start file between its own
//! directory and the application root. Paths use `/` separators and are
//! rooted at `/`.

pub const DEFAULT_VIEW_START_FILE_NAME: &str = "_ViewStart.cshtml";

/// Use `/` separators and a leading `/`; case is preserved.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// Cache key for a relative path. Lookups ignore case.
pub(crate) fn cache_key(path: &str) -> String {
    normalize_path(path).to_lowercase()
}

/// Candidate view-start paths for `path`, nearest directory first.
///
/// A view-start file does not depend on itself, only on those above it.
pub fn view_start_locations(path: &str, file_name: &str) -> Vec<String> {
    let normalized = normalize_path(path);
    let mut directory = normalized
        .rsplit_once('/')
        .map_or("", |(directory, _)| directory);

    let mut locations = Vec::new();
    loop {
        let location = format!("{directory}/{file_name}");
        if !location.eq_ignore_ascii_case(&normalized) {
            locations.push(location);
        }
        match directory.rsplit_once('/') {
            Some((parent, _)) => directory = parent,
            None => break,
        }
    }
    locations
}
