use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::markers::BinderMarker;
use super::model::{ModelKind, ModelMetadata, ModelTypeId, PropertyMetadata, ScalarKind};

/// Names of the scalar types every registry knows.
pub mod builtin {
    pub const STRING: &str = "string";
    pub const BOOL: &str = "bool";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const UUID: &str = "uuid";
    pub const DATETIME: &str = "datetime";
    pub const NULLABLE_BOOL: &str = "bool?";
    pub const NULLABLE_INT: &str = "int?";
    pub const NULLABLE_FLOAT: &str = "float?";
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("unknown model type `{name}`")]
    UnknownType { name: String },
    #[error("model type `{name}` is registered more than once")]
    DuplicateType { name: String },
    #[error("model type `{type_name}` extends unknown type `{base}`")]
    UnknownBaseType { type_name: String, base: String },
    #[error("inheritance cycle through model type `{type_name}`")]
    InheritanceCycle { type_name: String },
    #[error("property `{type_name}.{property}` has unknown type `{property_type}`")]
    UnknownPropertyType {
        type_name: String,
        property: String,
        property_type: String,
    },
    #[error("model type `{type_name}` contains unknown element type `{element}`")]
    UnknownElementType { type_name: String, element: String },
}

impl MetadataError {
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }
}

/// Read-only oracle answering structural questions about model types.
pub trait ModelMetadataProvider: Send + Sync {
    fn metadata_for_type(&self, full_name: &str) -> Result<Arc<ModelMetadata>, MetadataError>;
}

/// Declaration of a model type prior to registration.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    full_name: String,
    kind: ModelKind,
    nullable: bool,
    base: Option<String>,
    interfaces: Vec<String>,
    class_marker: Option<BinderMarker>,
    properties: Vec<PropertyMetadata>,
}

impl TypeDefinition {
    fn with_kind(full_name: impl Into<String>, kind: ModelKind, nullable: bool) -> Self {
        Self {
            full_name: full_name.into(),
            kind,
            nullable,
            base: None,
            interfaces: Vec::new(),
            class_marker: None,
            properties: Vec::new(),
        }
    }

    pub fn complex(full_name: impl Into<String>) -> Self {
        Self::with_kind(full_name, ModelKind::Complex, true)
    }

    pub fn scalar(full_name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::with_kind(full_name, ModelKind::Scalar(kind), false)
    }

    pub fn collection(full_name: impl Into<String>, element: impl Into<String>) -> Self {
        Self::with_kind(
            full_name,
            ModelKind::Collection {
                element: element.into(),
            },
            true,
        )
    }

    pub fn dictionary(full_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_kind(
            full_name,
            ModelKind::Dictionary {
                value: value.into(),
            },
            true,
        )
    }

    /// Interfaces and services: participate in assignability, never bound.
    pub fn opaque(full_name: impl Into<String>) -> Self {
        Self::with_kind(full_name, ModelKind::Opaque, true)
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_class_marker(mut self, marker: BinderMarker) -> Self {
        self.class_marker = Some(marker);
        self
    }

    pub fn property(mut self, property: PropertyMetadata) -> Self {
        self.properties.push(property);
        self
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }
}

fn builtin_definitions() -> Vec<TypeDefinition> {
    vec![
        TypeDefinition::scalar(builtin::STRING, ScalarKind::Text).nullable(true),
        TypeDefinition::scalar(builtin::BOOL, ScalarKind::Boolean),
        TypeDefinition::scalar(builtin::INT, ScalarKind::Integer),
        TypeDefinition::scalar(builtin::FLOAT, ScalarKind::Float),
        TypeDefinition::scalar(builtin::UUID, ScalarKind::Uuid),
        TypeDefinition::scalar(builtin::DATETIME, ScalarKind::DateTime),
        TypeDefinition::scalar(builtin::NULLABLE_BOOL, ScalarKind::Boolean).nullable(true),
        TypeDefinition::scalar(builtin::NULLABLE_INT, ScalarKind::Integer).nullable(true),
        TypeDefinition::scalar(builtin::NULLABLE_FLOAT, ScalarKind::Float).nullable(true),
    ]
}

/// Explicit descriptor table of every bindable type.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<ModelMetadata>>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder {
            definitions: builtin_definitions(),
        }
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.types.contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl ModelMetadataProvider for TypeRegistry {
    fn metadata_for_type(&self, full_name: &str) -> Result<Arc<ModelMetadata>, MetadataError> {
        self.types
            .get(full_name)
            .cloned()
            .ok_or_else(|| MetadataError::unknown_type(full_name))
    }
}

pub struct TypeRegistryBuilder {
    definitions: Vec<TypeDefinition>,
}

impl TypeRegistryBuilder {
    pub fn register(mut self, definition: TypeDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Resolve base chains, inherited properties and assignability.
    ///
    /// Types may be registered in any order; bases only need to exist.
    pub fn build(self) -> Result<TypeRegistry, MetadataError> {
        let mut ids = HashMap::with_capacity(self.definitions.len());
        let mut definitions = HashMap::with_capacity(self.definitions.len());
        for (index, definition) in self.definitions.into_iter().enumerate() {
            let name = definition.full_name.clone();
            if definitions.contains_key(&name) {
                return Err(MetadataError::DuplicateType { name });
            }
            let index = u32::try_from(index).unwrap_or(u32::MAX);
            ids.insert(name.clone(), ModelTypeId(index));
            definitions.insert(name, definition);
        }

        let mut resolver = Resolver {
            definitions: &definitions,
            ids: &ids,
            resolved: HashMap::with_capacity(definitions.len()),
        };
        for name in definitions.keys() {
            resolver.resolve(name, &mut Vec::new())?;
        }
        let types = resolver.resolved;

        for definition in definitions.values() {
            check_references(definition, &definitions)?;
        }

        debug!(types = types.len(), "Model type registry built");
        Ok(TypeRegistry { types })
    }
}

fn check_references(
    definition: &TypeDefinition,
    definitions: &HashMap<String, TypeDefinition>,
) -> Result<(), MetadataError> {
    for property in &definition.properties {
        if !definitions.contains_key(property.type_name()) {
            return Err(MetadataError::UnknownPropertyType {
                type_name: definition.full_name.clone(),
                property: property.name().to_string(),
                property_type: property.type_name().to_string(),
            });
        }
    }
    let element = match &definition.kind {
        ModelKind::Collection { element } => Some(element),
        ModelKind::Dictionary { value } => Some(value),
        _ => None,
    };
    if let Some(element) = element
        && !definitions.contains_key(element)
    {
        return Err(MetadataError::UnknownElementType {
            type_name: definition.full_name.clone(),
            element: element.clone(),
        });
    }
    Ok(())
}

struct Resolver<'a> {
    definitions: &'a HashMap<String, TypeDefinition>,
    ids: &'a HashMap<String, ModelTypeId>,
    resolved: HashMap<String, Arc<ModelMetadata>>,
}

impl Resolver<'_> {
    fn resolve(
        &mut self,
        name: &str,
        visiting: &mut Vec<String>,
    ) -> Result<Arc<ModelMetadata>, MetadataError> {
        if let Some(metadata) = self.resolved.get(name) {
            return Ok(Arc::clone(metadata));
        }
        if visiting.iter().any(|entry| entry == name) {
            return Err(MetadataError::InheritanceCycle {
                type_name: name.to_string(),
            });
        }
        let definitions = self.definitions;
        let definition = definitions
            .get(name)
            .ok_or_else(|| MetadataError::unknown_type(name))?;
        let id = self.ids[name];

        visiting.push(name.to_string());

        let mut lineage = vec![definition.full_name.clone()];
        let mut assignable_to = HashSet::from([id]);
        let mut properties: Vec<PropertyMetadata> = Vec::new();
        let mut class_marker = definition.class_marker.clone();

        if let Some(base) = definition.base.as_deref() {
            if !definitions.contains_key(base) {
                return Err(MetadataError::UnknownBaseType {
                    type_name: name.to_string(),
                    base: base.to_string(),
                });
            }
            let base = self.resolve(base, visiting)?;
            lineage.extend(base.lineage.iter().cloned());
            assignable_to.extend(base.assignable_to.iter().copied());
            properties.extend(base.properties.iter().cloned());
            if class_marker.is_none() {
                class_marker = base.class_marker.clone();
            }
        }

        for interface in &definition.interfaces {
            if !definitions.contains_key(interface) {
                return Err(MetadataError::UnknownBaseType {
                    type_name: name.to_string(),
                    base: interface.clone(),
                });
            }
            let interface = self.resolve(interface, visiting)?;
            assignable_to.extend(interface.assignable_to.iter().copied());
        }

        for property in &definition.properties {
            match properties
                .iter_mut()
                .find(|existing| existing.name() == property.name())
            {
                Some(existing) => *existing = property.clone(),
                None => properties.push(property.clone()),
            }
        }

        visiting.pop();

        let metadata = Arc::new(ModelMetadata {
            id,
            full_name: definition.full_name.clone(),
            kind: definition.kind.clone(),
            nullable: definition.nullable,
            class_marker,
            properties,
            lineage,
            assignable_to,
        });
        self.resolved.insert(name.to_string(), Arc::clone(&metadata));
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register(TypeDefinition::complex("Shop.Manager").extends("Shop.Employee"))
            .register(
                TypeDefinition::complex("Shop.Employee")
                    .extends("Shop.Person")
                    .implements("Shop.IWorker")
                    .property(PropertyMetadata::new("Title", builtin::STRING)),
            )
            .register(
                TypeDefinition::complex("Shop.Person")
                    .property(PropertyMetadata::new("Name", builtin::STRING))
                    .property(PropertyMetadata::new("Age", builtin::INT)),
            )
            .register(TypeDefinition::opaque("Shop.IWorker"))
            .build()
            .expect("registry builds")
    }

    #[test]
    fn resolves_bases_registered_later() {
        let registry = registry();
        let manager = registry
            .metadata_for_type("Shop.Manager")
            .expect("manager registered");

        let lineage: Vec<_> = manager.lineage().collect();
        assert_eq!(lineage, ["Shop.Manager", "Shop.Employee", "Shop.Person"]);
        assert_eq!(manager.base_type_name(), Some("Shop.Employee"));

        let names: Vec<_> = manager.properties().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["Name", "Age", "Title"]);
    }

    #[test]
    fn assignability_covers_bases_and_interfaces() {
        let registry = registry();
        let manager = registry.metadata_for_type("Shop.Manager").expect("manager");
        let person = registry.metadata_for_type("Shop.Person").expect("person");
        let worker = registry.metadata_for_type("Shop.IWorker").expect("worker");

        assert!(manager.is_assignable_to(&person));
        assert!(manager.is_assignable_to(&worker));
        assert!(manager.is_assignable_to(&manager));
        assert!(!person.is_assignable_to(&manager));
        assert!(!person.is_assignable_to(&worker));
    }

    #[test]
    fn rejects_cycles() {
        let err = TypeRegistry::builder()
            .register(TypeDefinition::complex("A").extends("B"))
            .register(TypeDefinition::complex("B").extends("A"))
            .build()
            .expect_err("cycle detected");
        assert!(matches!(err, MetadataError::InheritanceCycle { .. }));
    }

    #[test]
    fn rejects_unknown_references() {
        let err = TypeRegistry::builder()
            .register(TypeDefinition::complex("A").extends("Missing"))
            .build()
            .expect_err("unknown base");
        assert_eq!(
            err,
            MetadataError::UnknownBaseType {
                type_name: "A".to_string(),
                base: "Missing".to_string(),
            }
        );

        let err = TypeRegistry::builder()
            .register(TypeDefinition::complex("A").property(PropertyMetadata::new("X", "Nope")))
            .build()
            .expect_err("unknown property type");
        assert!(matches!(err, MetadataError::UnknownPropertyType { .. }));

        let err = TypeRegistry::builder()
            .register(TypeDefinition::complex("A"))
            .register(TypeDefinition::complex("A"))
            .build()
            .expect_err("duplicate");
        assert!(matches!(err, MetadataError::DuplicateType { .. }));
    }

    #[test]
    fn unknown_lookup_is_an_error() {
        let registry = registry();
        assert_eq!(
            registry.metadata_for_type("Shop.Ghost").expect_err("missing"),
            MetadataError::unknown_type("Shop.Ghost")
        );
    }
}
