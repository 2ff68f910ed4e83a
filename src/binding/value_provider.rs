//! Raw value sources keyed by binding prefix.
//!
//! Keys follow the dotted/bracketed path convention of the binder
//! (`person.address[0].street`) and are matched ASCII case-insensitively.

use std::fmt;
use std::sync::Arc;

use http::HeaderMap;
use indexmap::IndexMap;

use crate::metadata::BindingSource;

/// Values found under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueProviderResult {
    source: BindingSource,
    values: Vec<String>,
}

impl ValueProviderResult {
    pub fn new(source: BindingSource, values: Vec<String>) -> Self {
        Self { source, values }
    }

    pub fn source(&self) -> BindingSource {
        self.source
    }

    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Raw input as echoed back to the user alongside errors.
    pub fn attempted_value(&self) -> String {
        self.values.join(",")
    }
}

pub trait ValueProvider: Send + Sync {
    fn source(&self) -> BindingSource;

    /// True if any key equals `prefix` or extends it with `.` or `[`.
    /// The empty prefix matches any non-empty provider.
    fn contains_prefix(&self, prefix: &str) -> bool;

    fn get_value(&self, key: &str) -> Option<ValueProviderResult>;

    /// Bracketed child segments directly under `prefix`: for `items`, the
    /// keys `items[0].name` and `items[k]` yield `0` and `k`.
    fn child_keys(&self, prefix: &str) -> Vec<String>;
}

#[derive(Debug, Clone)]
struct KeyedValues {
    key: String,
    values: Vec<String>,
}

/// In-memory provider for one source: query, headers, route values or form.
#[derive(Debug, Clone)]
pub struct DictionaryValueProvider {
    source: BindingSource,
    entries: IndexMap<String, KeyedValues>,
}

impl DictionaryValueProvider {
    pub fn new(source: BindingSource) -> Self {
        Self {
            source,
            entries: IndexMap::new(),
        }
    }

    pub fn from_pairs<I, K, V>(source: BindingSource, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut provider = Self::new(source);
        for (key, value) in pairs {
            provider.insert(key, value);
        }
        provider
    }

    /// Parse an `application/x-www-form-urlencoded` query string.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(
            BindingSource::Query,
            url::form_urlencoded::parse(query.as_bytes()),
        )
    }

    pub fn from_form(body: &[u8]) -> Self {
        Self::from_pairs(BindingSource::Form, url::form_urlencoded::parse(body))
    }

    /// Header values that are not visible ASCII are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut provider = Self::new(BindingSource::Header);
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                provider.insert(name.as_str(), value);
            }
        }
        provider
    }

    pub fn from_route<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_pairs(BindingSource::Route, values)
    }

    /// Append a value; repeated keys accumulate.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries
            .entry(key.to_ascii_lowercase())
            .or_insert_with(|| KeyedValues {
                key,
                values: Vec::new(),
            })
            .values
            .push(value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn extends_prefix(key: &str, prefix: &str) -> bool {
    if key.len() == prefix.len() {
        return key == prefix;
    }
    key.starts_with(prefix) && matches!(key.as_bytes()[prefix.len()], b'.' | b'[')
}

impl ValueProvider for DictionaryValueProvider {
    fn source(&self) -> BindingSource {
        self.source
    }

    fn contains_prefix(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return !self.entries.is_empty();
        }
        let prefix = prefix.to_ascii_lowercase();
        self.entries.keys().any(|key| extends_prefix(key, &prefix))
    }

    fn get_value(&self, key: &str) -> Option<ValueProviderResult> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|entry| ValueProviderResult::new(self.source, entry.values.clone()))
    }

    fn child_keys(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_ascii_lowercase();
        let mut children: Vec<String> = Vec::new();
        for (lowered, entry) in &self.entries {
            let Some(rest) = lowered.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if !rest.starts_with('[') {
                continue;
            }
            let Some(close) = rest.find(']') else {
                continue;
            };
            // Lowercasing is ASCII-only, so byte offsets line up with the original key.
            let start = prefix.len() + 1;
            let child = &entry.key[start..prefix.len() + close];
            if !children.iter().any(|existing| existing == child) {
                children.push(child.to_string());
            }
        }
        children
    }
}

/// Ordered set of providers; the first provider holding a key wins.
#[derive(Clone, Default)]
pub struct CompositeValueProvider {
    providers: Vec<Arc<dyn ValueProvider>>,
}

impl fmt::Debug for CompositeValueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|provider| provider.source()))
            .finish()
    }
}

impl CompositeValueProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl ValueProvider + 'static) -> Self {
        self.push(Arc::new(provider));
        self
    }

    pub fn push(&mut self, provider: Arc<dyn ValueProvider>) {
        self.providers.push(provider);
    }

    /// Providers of a single source, in their original order.
    pub fn filtered(&self, source: BindingSource) -> Self {
        Self {
            providers: self
                .providers
                .iter()
                .filter(|provider| provider.source() == source)
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.providers
            .iter()
            .any(|provider| provider.contains_prefix(prefix))
    }

    pub fn get_value(&self, key: &str) -> Option<ValueProviderResult> {
        self.providers
            .iter()
            .find_map(|provider| provider.get_value(key))
    }

    pub fn child_keys(&self, prefix: &str) -> Vec<String> {
        let mut children: Vec<String> = Vec::new();
        for provider in &self.providers {
            for child in provider.child_keys(prefix) {
                if !children.contains(&child) {
                    children.push(child);
                }
            }
        }
        children
    }
}
