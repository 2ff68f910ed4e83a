//! Per-key binding and validation outcomes accumulated across one bind.

use indexmap::IndexMap;
use serde::Serialize;

use super::value_provider::ValueProviderResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelValidationState {
    #[default]
    Unvalidated,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    /// Raw input could not be converted to the target type.
    Conversion,
    /// A validation rule rejected the bound value.
    Validation,
    /// The request body could not be read into the model.
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelError {
    kind: ModelErrorKind,
    message: String,
}

impl ModelError {
    pub fn conversion(message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::Conversion,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::Validation,
            message: message.into(),
        }
    }

    pub fn body(message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::Body,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ModelErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelStateEntry {
    raw_value: Option<Vec<String>>,
    attempted_value: Option<String>,
    errors: Vec<ModelError>,
    validation_state: ModelValidationState,
}

impl ModelStateEntry {
    pub fn raw_value(&self) -> Option<&[String]> {
        self.raw_value.as_deref()
    }

    pub fn attempted_value(&self) -> Option<&str> {
        self.attempted_value.as_deref()
    }

    pub fn errors(&self) -> &[ModelError] {
        &self.errors
    }

    pub fn validation_state(&self) -> ModelValidationState {
        self.validation_state
    }
}

/// Keyed by binding key; iteration follows first insertion so errors surface
/// in the order they were produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ModelStateDictionary {
    entries: IndexMap<String, ModelStateEntry>,
}

impl ModelStateDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ModelStateEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelStateEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Record the raw input seen for `key`.
    pub fn set_model_value(&mut self, key: &str, result: &ValueProviderResult) {
        let entry = self.entry_mut(key);
        entry.raw_value = Some(result.values().to_vec());
        entry.attempted_value = Some(result.attempted_value());
    }

    pub fn add_model_error(&mut self, key: &str, error: ModelError) {
        let entry = self.entry_mut(key);
        entry.errors.push(error);
        entry.validation_state = ModelValidationState::Invalid;
    }

    /// Mark an existing, error-free entry valid. Unknown keys are ignored.
    pub fn mark_field_valid(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key)
            && entry.validation_state != ModelValidationState::Invalid
        {
            entry.validation_state = ModelValidationState::Valid;
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &ModelError)> {
        self.entries
            .iter()
            .flat_map(|(key, entry)| entry.errors.iter().map(move |error| (key.as_str(), error)))
    }

    pub fn error_count(&self) -> usize {
        self.entries.values().map(|entry| entry.errors.len()).sum()
    }

    pub fn is_valid(&self) -> bool {
        self.validation_state() != ModelValidationState::Invalid
    }

    /// Invalid if any entry is invalid, unvalidated if any entry is still
    /// unvalidated, valid otherwise. An empty dictionary is valid.
    pub fn validation_state(&self) -> ModelValidationState {
        let mut state = ModelValidationState::Valid;
        for entry in self.entries.values() {
            match entry.validation_state {
                ModelValidationState::Invalid => return ModelValidationState::Invalid,
                ModelValidationState::Unvalidated => state = ModelValidationState::Unvalidated,
                ModelValidationState::Valid => {}
            }
        }
        state
    }

    /// Validation state of `key` and every key nested under it.
    pub fn field_validation_state(&self, key: &str) -> ModelValidationState {
        let mut state = None;
        for (entry_key, entry) in &self.entries {
            if !is_same_or_nested(entry_key, key) {
                continue;
            }
            match entry.validation_state {
                ModelValidationState::Invalid => return ModelValidationState::Invalid,
                ModelValidationState::Unvalidated => {
                    state = Some(ModelValidationState::Unvalidated)
                }
                ModelValidationState::Valid => {
                    state.get_or_insert(ModelValidationState::Valid);
                }
            }
        }
        state.unwrap_or(ModelValidationState::Unvalidated)
    }

    fn entry_mut(&mut self, key: &str) -> &mut ModelStateEntry {
        self.entries.entry(key.to_string()).or_default()
    }
}

fn is_same_or_nested(candidate: &str, key: &str) -> bool {
    if key.is_empty() {
        return true;
    }
    candidate == key
        || (candidate.starts_with(key)
            && matches!(candidate.as_bytes().get(key.len()), Some(b'.' | b'[')))
}
