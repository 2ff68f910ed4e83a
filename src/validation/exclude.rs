//! Filters deciding which model types are skipped during validation.
//!
//! Two kinds of registration exist. A type registration excludes the type and
//! everything assignable to it, including implementors of an interface. A
//! type-name registration excludes a type only when its own full name, or the
//! full name of one of its base types, equals the registered string.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::ValidationSettings;
use crate::metadata::{MetadataError, ModelMetadata, ModelMetadataProvider};

pub trait ExcludeTypeValidationFilter: Send + Sync + fmt::Debug {
    fn is_type_excluded(&self, metadata: &ModelMetadata) -> bool;
}

/// Excludes a target type and every type assignable to it.
#[derive(Debug, Clone)]
pub struct TypeBasedExcludeFilter {
    target: Arc<ModelMetadata>,
}

impl TypeBasedExcludeFilter {
    pub fn new(target: Arc<ModelMetadata>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &ModelMetadata {
        &self.target
    }
}

impl ExcludeTypeValidationFilter for TypeBasedExcludeFilter {
    fn is_type_excluded(&self, metadata: &ModelMetadata) -> bool {
        metadata.is_assignable_to(&self.target)
    }
}

/// Excludes types whose base chain contains an exact (ordinal) full name.
///
/// Interfaces are not consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNameBasedExcludeFilter {
    type_full_name: String,
}

impl TypeNameBasedExcludeFilter {
    pub fn new(type_full_name: impl Into<String>) -> Self {
        Self {
            type_full_name: type_full_name.into(),
        }
    }

    pub fn type_full_name(&self) -> &str {
        &self.type_full_name
    }
}

impl ExcludeTypeValidationFilter for TypeNameBasedExcludeFilter {
    fn is_type_excluded(&self, metadata: &ModelMetadata) -> bool {
        metadata.lineage().any(|name| name == self.type_full_name)
    }
}

/// One registration, activated into a filter at startup.
#[derive(Debug, Clone)]
pub enum ExcludeValidationDescriptor {
    /// Resolved through the metadata provider into a [`TypeBasedExcludeFilter`].
    Type(String),
    TypeName(String),
    Filter(Arc<dyn ExcludeTypeValidationFilter>),
}

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("cannot activate validation exclude filter for `{type_name}`: {source}")]
    UnresolvedType {
        type_name: String,
        #[source]
        source: MetadataError,
    },
}

/// Ordered registrations of exclude filters.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilterOptions {
    descriptors: Vec<ExcludeValidationDescriptor>,
}

impl ExcludeFilterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude `type_name` and all types assignable to it.
    pub fn add_type(&mut self, type_name: impl Into<String>) -> &mut Self {
        self.descriptors
            .push(ExcludeValidationDescriptor::Type(type_name.into()));
        self
    }

    /// Exclude types whose base chain contains exactly `type_full_name`.
    pub fn add_type_name(&mut self, type_full_name: impl Into<String>) -> &mut Self {
        self.descriptors
            .push(ExcludeValidationDescriptor::TypeName(type_full_name.into()));
        self
    }

    pub fn add_filter(&mut self, filter: Arc<dyn ExcludeTypeValidationFilter>) -> &mut Self {
        self.descriptors
            .push(ExcludeValidationDescriptor::Filter(filter));
        self
    }

    pub fn descriptors(&self) -> &[ExcludeValidationDescriptor] {
        &self.descriptors
    }

    /// Instantiate every registration, in order. An unresolvable type aborts
    /// activation.
    pub fn activate(
        &self,
        provider: &dyn ModelMetadataProvider,
    ) -> Result<ExcludeFilters, ActivationError> {
        let mut filters: Vec<Arc<dyn ExcludeTypeValidationFilter>> =
            Vec::with_capacity(self.descriptors.len());
        for descriptor in &self.descriptors {
            let filter: Arc<dyn ExcludeTypeValidationFilter> = match descriptor {
                ExcludeValidationDescriptor::Type(type_name) => {
                    let target = provider.metadata_for_type(type_name).map_err(|source| {
                        ActivationError::UnresolvedType {
                            type_name: type_name.clone(),
                            source,
                        }
                    })?;
                    Arc::new(TypeBasedExcludeFilter::new(target))
                }
                ExcludeValidationDescriptor::TypeName(name) => {
                    Arc::new(TypeNameBasedExcludeFilter::new(name.clone()))
                }
                ExcludeValidationDescriptor::Filter(filter) => Arc::clone(filter),
            };
            filters.push(filter);
        }
        debug!(filters = filters.len(), "Validation exclude filters activated");
        Ok(ExcludeFilters {
            filters: filters.into(),
        })
    }
}

impl From<&ValidationSettings> for ExcludeFilterOptions {
    fn from(settings: &ValidationSettings) -> Self {
        let mut options = Self::new();
        for type_name in &settings.exclude_types {
            options.add_type(type_name.clone());
        }
        for type_name in &settings.exclude_type_names {
            options.add_type_name(type_name.clone());
        }
        options
    }
}

/// Activated, read-only filter chain. A type is excluded when any filter
/// matches it.
#[derive(Debug, Clone)]
pub struct ExcludeFilters {
    filters: Arc<[Arc<dyn ExcludeTypeValidationFilter>]>,
}

impl Default for ExcludeFilters {
    fn default() -> Self {
        Self::empty()
    }
}

impl ExcludeFilters {
    pub fn empty() -> Self {
        Self {
            filters: Arc::from(Vec::new()),
        }
    }

    pub fn is_excluded(&self, metadata: &ModelMetadata) -> bool {
        self.filters
            .iter()
            .any(|filter| filter.is_type_excluded(metadata))
    }

    pub fn filters(&self) -> &[Arc<dyn ExcludeTypeValidationFilter>] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::metadata::{TypeDefinition, TypeRegistry};

    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register(TypeDefinition::opaque("System.Xml.Linq.IXNode"))
            .register(TypeDefinition::complex("System.Xml.Linq.XObject"))
            .register(
                TypeDefinition::complex("System.Xml.Linq.XNode")
                    .extends("System.Xml.Linq.XObject")
                    .implements("System.Xml.Linq.IXNode"),
            )
            .register(
                TypeDefinition::complex("System.Xml.Linq.XElement")
                    .extends("System.Xml.Linq.XNode"),
            )
            .register(TypeDefinition::complex("Other.XNode"))
            .register(TypeDefinition::complex("App.Person"))
            .build()
            .expect("registry")
    }

    fn metadata(registry: &TypeRegistry, name: &str) -> Arc<ModelMetadata> {
        registry.metadata_for_type(name).expect("registered type")
    }

    #[test]
    fn type_filter_matches_subtypes_and_implementors() {
        let registry = registry();
        let filter = TypeBasedExcludeFilter::new(metadata(&registry, "System.Xml.Linq.XNode"));

        assert!(filter.is_type_excluded(&metadata(&registry, "System.Xml.Linq.XNode")));
        assert!(filter.is_type_excluded(&metadata(&registry, "System.Xml.Linq.XElement")));
        assert!(!filter.is_type_excluded(&metadata(&registry, "System.Xml.Linq.XObject")));
        assert!(!filter.is_type_excluded(&metadata(&registry, "Other.XNode")));

        let by_interface =
            TypeBasedExcludeFilter::new(metadata(&registry, "System.Xml.Linq.IXNode"));
        let element = metadata(&registry, "System.Xml.Linq.XElement");
        assert!(by_interface.is_type_excluded(&element));
        assert!(!by_interface.is_type_excluded(&metadata(&registry, "App.Person")));
    }

    #[test]
    fn name_filter_walks_base_chain_only() {
        let registry = registry();
        let filter = TypeNameBasedExcludeFilter::new("System.Xml.Linq.XNode");

        assert!(filter.is_type_excluded(&metadata(&registry, "System.Xml.Linq.XNode")));
        assert!(filter.is_type_excluded(&metadata(&registry, "System.Xml.Linq.XElement")));
        assert!(!filter.is_type_excluded(&metadata(&registry, "Other.XNode")));
        assert!(!filter.is_type_excluded(&metadata(&registry, "System.Xml.Linq.XObject")));

        let interface_name = TypeNameBasedExcludeFilter::new("System.Xml.Linq.IXNode");
        let element = metadata(&registry, "System.Xml.Linq.XElement");
        assert!(!interface_name.is_type_excluded(&element));
    }

    #[test]
    fn name_comparison_is_ordinal() {
        let registry = registry();
        let filter = TypeNameBasedExcludeFilter::new("system.xml.linq.xnode");
        assert!(!filter.is_type_excluded(&metadata(&registry, "System.Xml.Linq.XNode")));
    }

    #[test]
    fn activation_preserves_order_and_ors_filters() {
        let registry = registry();
        let mut options = ExcludeFilterOptions::new();
        options
            .add_type_name("App.Person")
            .add_type("System.Xml.Linq.XObject");

        let filters = options.activate(&registry).expect("activated");
        assert_eq!(filters.len(), 2);
        assert!(filters.is_excluded(&metadata(&registry, "App.Person")));
        assert!(filters.is_excluded(&metadata(&registry, "System.Xml.Linq.XElement")));
        assert!(!filters.is_excluded(&metadata(&registry, "Other.XNode")));
    }

    #[test]
    fn activation_fails_for_unknown_types() {
        let registry = registry();
        let mut options = ExcludeFilterOptions::new();
        options.add_type("Missing.Type");

        let err = options.activate(&registry).expect_err("unresolved type");
        assert!(matches!(
            err,
            ActivationError::UnresolvedType { ref type_name, .. } if type_name == "Missing.Type"
        ));
    }

    #[test]
    fn custom_filters_participate() {
        #[derive(Debug)]
        struct Everything;
        impl ExcludeTypeValidationFilter for Everything {
            fn is_type_excluded(&self, _metadata: &ModelMetadata) -> bool {
                true
            }
        }

        let registry = registry();
        let mut options = ExcludeFilterOptions::new();
        options.add_filter(Arc::new(Everything));
        let filters = options.activate(&registry).expect("activated");
        assert!(filters.is_excluded(&metadata(&registry, "App.Person")));
        assert!(!ExcludeFilters::empty().is_excluded(&metadata(&registry, "App.Person")));
    }
}
