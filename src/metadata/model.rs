use std::collections::HashSet;

use serde_json::{Map, Value};

use super::markers::BinderMarker;

/// Registry-assigned identity of a model type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelTypeId(pub(crate) u32);

impl ModelTypeId {
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Leaf value kinds convertible from a single raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Text,
    Boolean,
    Integer,
    Float,
    Uuid,
    DateTime,
}

impl ScalarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Uuid => "uuid",
            Self::DateTime => "datetime",
        }
    }
}

/// Structural shape of a model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelKind {
    Scalar(ScalarKind),
    Complex,
    Collection { element: String },
    Dictionary { value: String },
    /// Interfaces and service types: no binder produces them.
    Opaque,
}

/// Declarative validation rules checked after binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationRules {
    pub required: bool,
    pub max_length: Option<usize>,
    pub range: Option<(f64, f64)>,
}

impl ValidationRules {
    pub fn is_empty(&self) -> bool {
        !self.required && self.max_length.is_none() && self.range.is_none()
    }
}

/// Binding and validation descriptor for one declared property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMetadata {
    name: String,
    type_name: String,
    marker: Option<BinderMarker>,
    bound_by_default: bool,
    rules: ValidationRules,
}

impl PropertyMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            marker: None,
            bound_by_default: true,
            rules: ValidationRules::default(),
        }
    }

    pub fn with_marker(mut self, marker: BinderMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Opt the property out of the default binding set.
    pub fn not_bound_by_default(mut self) -> Self {
        self.bound_by_default = false;
        self
    }

    pub fn required(mut self) -> Self {
        self.rules.required = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.rules.max_length = Some(max);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.rules.range = Some((min, max));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn marker(&self) -> Option<&BinderMarker> {
        self.marker.as_ref()
    }

    pub fn is_bound_by_default(&self) -> bool {
        self.bound_by_default
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }
}

/// Pre-resolved metadata for one model type.
///
/// Built by [`super::TypeRegistry`]; the base chain and the assignable set are
/// computed once at registration so that exclude filters never walk the
/// registry.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub(crate) id: ModelTypeId,
    pub(crate) full_name: String,
    pub(crate) kind: ModelKind,
    pub(crate) nullable: bool,
    pub(crate) class_marker: Option<BinderMarker>,
    pub(crate) properties: Vec<PropertyMetadata>,
    pub(crate) lineage: Vec<String>,
    pub(crate) assignable_to: HashSet<ModelTypeId>,
}

impl ModelMetadata {
    pub fn id(&self) -> ModelTypeId {
        self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.kind, ModelKind::Complex)
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self.kind {
            ModelKind::Scalar(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn class_marker(&self) -> Option<&BinderMarker> {
        self.class_marker.as_ref()
    }

    /// Declared properties, inherited ones first.
    pub fn properties(&self) -> &[PropertyMetadata] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyMetadata> {
        self.properties.iter().find(|property| property.name == name)
    }

    /// Full names of this type followed by its base types, nearest first.
    pub fn lineage(&self) -> impl Iterator<Item = &str> {
        self.lineage.iter().map(String::as_str)
    }

    pub fn base_type_name(&self) -> Option<&str> {
        self.lineage.get(1).map(String::as_str)
    }

    /// Whether a value of this type can be used where `target` is expected:
    /// identity, any base type, or any implemented interface.
    pub fn is_assignable_to(&self, target: &ModelMetadata) -> bool {
        self.assignable_to.contains(&target.id)
    }

    /// Value a binder produces when a node must exist but has no input.
    pub fn default_value(&self) -> Value {
        if self.nullable {
            return Value::Null;
        }
        match &self.kind {
            ModelKind::Scalar(ScalarKind::Boolean) => Value::Bool(false),
            ModelKind::Scalar(ScalarKind::Integer) => Value::from(0_i64),
            ModelKind::Scalar(ScalarKind::Float) => Value::from(0.0_f64),
            _ => Value::Null,
        }
    }

    /// Value produced for a forced node that received nothing: an empty
    /// string, collection or map rather than null.
    pub fn empty_value(&self) -> Value {
        match &self.kind {
            ModelKind::Scalar(ScalarKind::Text) => Value::String(String::new()),
            ModelKind::Collection { .. } => Value::Array(Vec::new()),
            ModelKind::Dictionary { .. } | ModelKind::Complex => Value::Object(Map::new()),
            _ => self.default_value(),
        }
    }
}
