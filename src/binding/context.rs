use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::BindingSettings;
use crate::metadata::{
    BinderMarker, BindingSource, ModelMetadata, ModelMetadataProvider, PropertyMetadata, forces,
};

use super::binders::ModelBinder;
use super::body::BodyModelReader;
use super::value_provider::CompositeValueProvider;

const DEFAULT_MAX_DEPTH: usize = 32;

/// Outcome of binding one node.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelBindingResult {
    Bound(Value),
    /// No source contributed and nothing forced the node; callers leave the
    /// target untouched.
    NotBound,
}

impl ModelBindingResult {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Bound(value) => Some(value),
            Self::NotBound => None,
        }
    }
}

/// Include/exclude lists for the root model's properties.
///
/// Exclusion wins when a name is in both lists. Without an include list the
/// default set applies: properties bound by default plus every property that
/// declares a marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyFilter {
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
}

impl PropertyFilter {
    pub fn include<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().with_include(names)
    }

    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().with_exclude(names)
    }

    pub fn with_include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include
            .get_or_insert_with(HashSet::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn has_include_list(&self) -> bool {
        self.include.is_some()
    }

    pub fn allows(&self, property: &PropertyMetadata) -> bool {
        if self.exclude.contains(property.name()) {
            return false;
        }
        match &self.include {
            Some(include) => include.contains(property.name()),
            None => property.is_bound_by_default() || property.marker().is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingOptions {
    /// Nesting limit guarding against cyclic forced graphs.
    pub max_depth: usize,
    /// Retry a top-level complex model under the empty prefix when nothing
    /// is found under its own name.
    pub fallback_to_empty_prefix: bool,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            fallback_to_empty_prefix: true,
        }
    }
}

impl From<&BindingSettings> for BindingOptions {
    fn from(settings: &BindingSettings) -> Self {
        Self {
            max_depth: settings.max_depth.get(),
            fallback_to_empty_prefix: settings.fallback_to_empty_prefix,
        }
    }
}

/// State of one node in the bind tree.
#[derive(Debug, Clone)]
pub struct ModelBindingContext {
    /// Binding key of this node (`person.address[0]`).
    pub model_name: String,
    /// Declared property or parameter name; names headers by default.
    pub field_name: String,
    pub metadata: Arc<ModelMetadata>,
    /// Existing value when updating a model in place.
    pub model: Option<Value>,
    /// Marker from the property or parameter, else from the type.
    pub marker: Option<BinderMarker>,
    /// Providers visible to this node after source scoping.
    pub value_provider: Arc<CompositeValueProvider>,
    pub property_filter: PropertyFilter,
    pub is_top_level: bool,
    pub depth: usize,
}

impl ModelBindingContext {
    pub fn is_forced(&self) -> bool {
        forces(self.marker.as_ref())
    }

    pub(crate) fn child(
        &self,
        operation: &OperationBindingContext<'_>,
        model_name: String,
        field_name: &str,
        metadata: Arc<ModelMetadata>,
        model: Option<Value>,
    ) -> Self {
        let marker = metadata.class_marker().cloned();
        self.child_with_marker(operation, model_name, field_name, metadata, marker, model)
    }

    pub(crate) fn child_with_marker(
        &self,
        operation: &OperationBindingContext<'_>,
        model_name: String,
        field_name: &str,
        metadata: Arc<ModelMetadata>,
        marker: Option<BinderMarker>,
        model: Option<Value>,
    ) -> Self {
        let value_provider = operation.scoped_provider(marker.as_ref(), &self.value_provider);
        Self {
            model_name,
            field_name: field_name.to_string(),
            metadata,
            model,
            marker,
            value_provider,
            property_filter: PropertyFilter::default(),
            is_top_level: false,
            depth: self.depth + 1,
        }
    }
}

/// Services shared by every node of one bind.
pub struct OperationBindingContext<'a> {
    pub metadata_provider: &'a dyn ModelMetadataProvider,
    /// Unscoped providers of the request.
    pub value_provider: Arc<CompositeValueProvider>,
    pub body_reader: Option<&'a dyn BodyModelReader>,
    /// Entry binder used for recursion into child nodes.
    pub binder: &'a dyn ModelBinder,
    pub options: &'a BindingOptions,
}

impl fmt::Debug for OperationBindingContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationBindingContext")
            .field("value_provider", &self.value_provider)
            .field("has_body", &self.body_reader.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl OperationBindingContext<'_> {
    /// Providers for a node declaring `marker`: a source marker restricts the
    /// node (and its descendants) to that source, otherwise the parent's
    /// scope is inherited.
    pub fn scoped_provider(
        &self,
        marker: Option<&BinderMarker>,
        inherited: &Arc<CompositeValueProvider>,
    ) -> Arc<CompositeValueProvider> {
        match marker.and_then(BinderMarker::source) {
            Some(BindingSource::Body) | None => Arc::clone(inherited),
            Some(source) => Arc::new(self.value_provider.filtered(source)),
        }
    }
}

/// Marker governing a property: declared on the property, else on its type.
pub(crate) fn effective_marker(
    property: &PropertyMetadata,
    property_type: &ModelMetadata,
) -> Option<BinderMarker> {
    property
        .marker()
        .or_else(|| property_type.class_marker())
        .cloned()
}

/// `prefix.name`, or `name` under the empty prefix.
pub fn property_model_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// `prefix[index]`.
pub fn index_model_name(prefix: &str, index: impl fmt::Display) -> String {
    format!("{prefix}[{index}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_wins_over_inclusion() {
        let filter = PropertyFilter::include(["A", "B"]).with_exclude(["B"]);
        assert!(filter.allows(&PropertyMetadata::new("A", "string")));
        assert!(!filter.allows(&PropertyMetadata::new("B", "string")));
        assert!(!filter.allows(&PropertyMetadata::new("C", "string")));
    }

    #[test]
    fn default_set_honours_opt_outs_and_markers() {
        let filter = PropertyFilter::default();
        assert!(filter.allows(&PropertyMetadata::new("Name", "string")));
        assert!(!filter.allows(&PropertyMetadata::new("Count", "int").not_bound_by_default()));
        assert!(
            filter.allows(
                &PropertyMetadata::new("Count2", "int")
                    .not_bound_by_default()
                    .with_marker(BinderMarker::from_query())
            )
        );
    }

    #[test]
    fn model_names_compose() {
        assert_eq!(property_model_name("", "Name"), "Name");
        assert_eq!(property_model_name("person", "Name"), "person.Name");
        assert_eq!(index_model_name("items", 3), "items[3]");
        assert_eq!(index_model_name("", "key"), "[key]");
    }
}
