use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::binding::{ModelError, ModelStateDictionary, index_model_name, property_model_name};
use crate::metadata::{
    MetadataError, ModelKind, ModelMetadata, ModelMetadataProvider, PropertyMetadata,
};

use super::exclude::ExcludeFilters;

const DEFAULT_MAX_DEPTH: usize = 32;

/// Walks a bound model and records rule violations in model state.
///
/// Subtrees whose type is excluded are not visited and their keys stay
/// unvalidated. Keys already carrying binding errors are not re-checked.
#[derive(Clone)]
pub struct ModelValidator {
    metadata_provider: Arc<dyn ModelMetadataProvider>,
    exclude_filters: ExcludeFilters,
    max_depth: usize,
}

impl ModelValidator {
    pub fn new(
        metadata_provider: Arc<dyn ModelMetadataProvider>,
        exclude_filters: ExcludeFilters,
    ) -> Self {
        Self {
            metadata_provider,
            exclude_filters,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn exclude_filters(&self) -> &ExcludeFilters {
        &self.exclude_filters
    }

    pub fn validate(
        &self,
        model: &Value,
        metadata: &ModelMetadata,
        key: &str,
        model_state: &mut ModelStateDictionary,
    ) -> Result<(), MetadataError> {
        self.visit(model, metadata, key, model_state, 0)
    }

    fn visit(
        &self,
        value: &Value,
        metadata: &ModelMetadata,
        key: &str,
        model_state: &mut ModelStateDictionary,
        depth: usize,
    ) -> Result<(), MetadataError> {
        if depth > self.max_depth {
            warn!(
                model_name = key,
                max_depth = self.max_depth,
                "Validation depth limit reached"
            );
            return Ok(());
        }
        if self.exclude_filters.is_excluded(metadata) {
            debug!(
                model_name = key,
                model_type = metadata.full_name(),
                "Validation skipped for excluded type"
            );
            return Ok(());
        }

        match (metadata.kind(), value) {
            (ModelKind::Complex, Value::Object(object)) => {
                for property in metadata.properties() {
                    let child_key = property_model_name(key, property.name());
                    let child_value = object.get(property.name()).unwrap_or(&Value::Null);
                    check_rules(property, child_value, &child_key, model_state);

                    let property_type = self
                        .metadata_provider
                        .metadata_for_type(property.type_name())?;
                    self.visit(child_value, &property_type, &child_key, model_state, depth + 1)?;
                }
            }
            (ModelKind::Collection { element }, Value::Array(items)) => {
                let element = self.metadata_provider.metadata_for_type(element)?;
                for (index, item) in items.iter().enumerate() {
                    let child_key = index_model_name(key, index);
                    self.visit(item, &element, &child_key, model_state, depth + 1)?;
                }
            }
            (ModelKind::Dictionary { value }, Value::Object(entries)) => {
                let value_type = self.metadata_provider.metadata_for_type(value)?;
                for (entry_key, entry) in entries {
                    let child_key = index_model_name(key, entry_key);
                    self.visit(entry, &value_type, &child_key, model_state, depth + 1)?;
                }
            }
            _ => {}
        }

        model_state.mark_field_valid(key);
        Ok(())
    }
}

fn check_rules(
    property: &PropertyMetadata,
    value: &Value,
    key: &str,
    model_state: &mut ModelStateDictionary,
) {
    let rules = property.rules();
    if rules.is_empty() {
        return;
    }
    if model_state
        .get(key)
        .is_some_and(|entry| !entry.errors().is_empty())
    {
        return;
    }

    let name = property.name();
    let missing = match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    };
    if rules.required && missing {
        model_state.add_model_error(
            key,
            ModelError::validation(format!("The {name} field is required.")),
        );
        return;
    }

    if let Some(max) = rules.max_length {
        let length = match value {
            Value::String(text) => Some(text.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if length.is_some_and(|length| length > max) {
            model_state.add_model_error(
                key,
                ModelError::validation(format!(
                    "The field {name} must be a string or array type with a maximum length of \
                     '{max}'."
                )),
            );
        }
    }

    if let Some((min, max)) = rules.range
        && let Some(number) = value.as_f64()
        && (number < min || number > max)
    {
        model_state.add_model_error(
            key,
            ModelError::validation(format!("The field {name} must be between {min} and {max}.")),
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::binding::ModelValidationState;
    use crate::metadata::{TypeDefinition, TypeRegistry, builtin};
    use crate::validation::ExcludeFilterOptions;

    use super::*;

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::builder()
                .register(
                    TypeDefinition::complex("Order")
                        .property(PropertyMetadata::new("Reference", builtin::STRING).required())
                        .property(PropertyMetadata::new("Quantity", builtin::INT).range(1.0, 10.0))
                        .property(PropertyMetadata::new("Note", builtin::STRING).max_length(5))
                        .property(PropertyMetadata::new("Lines", "OrderLines"))
                        .property(PropertyMetadata::new("Raw", "RawDocument")),
                )
                .register(TypeDefinition::collection("OrderLines", "OrderLine"))
                .register(
                    TypeDefinition::complex("OrderLine")
                        .property(PropertyMetadata::new("Sku", builtin::STRING).required()),
                )
                .register(
                    TypeDefinition::complex("RawDocument")
                        .property(PropertyMetadata::new("Body", builtin::STRING).required()),
                )
                .build()
                .expect("registry"),
        )
    }

    fn validator(registry: &Arc<TypeRegistry>, excluded: &[&str]) -> ModelValidator {
        let mut options = ExcludeFilterOptions::new();
        for name in excluded {
            options.add_type(*name);
        }
        let filters = options.activate(registry.as_ref()).expect("filters");
        ModelValidator::new(registry.clone(), filters)
    }

    #[test]
    fn reports_rule_violations_with_keys() {
        let registry = registry();
        let order = registry.metadata_for_type("Order").expect("order");
        let model = json!({
            "Reference": "",
            "Quantity": 12,
            "Note": "too long",
            "Lines": [{ "Sku": "A-1" }, { "Sku": null }],
            "Raw": { "Body": "ok" }
        });
        let mut state = ModelStateDictionary::new();

        validator(&registry, &[])
            .validate(&model, &order, "order", &mut state)
            .expect("validated");

        let errors: Vec<_> = state.errors().map(|(key, e)| (key, e.message())).collect();
        assert_eq!(
            errors,
            [
                ("order.Reference", "The Reference field is required."),
                ("order.Quantity", "The field Quantity must be between 1 and 10."),
                (
                    "order.Note",
                    "The field Note must be a string or array type with a maximum length of '5'."
                ),
                ("order.Lines[1].Sku", "The Sku field is required."),
            ]
        );
    }

    #[test]
    fn excluded_subtrees_are_not_validated() {
        let registry = registry();
        let order = registry.metadata_for_type("Order").expect("order");
        let model = json!({
            "Reference": "R-1",
            "Quantity": 2,
            "Raw": { "Body": null }
        });
        let mut state = ModelStateDictionary::new();

        validator(&registry, &["RawDocument"])
            .validate(&model, &order, "", &mut state)
            .expect("validated");

        assert!(state.is_valid());
        assert!(!state.contains_key("Raw.Body"));
        assert_eq!(
            state.field_validation_state("Raw"),
            ModelValidationState::Unvalidated
        );
    }

    #[test]
    fn keys_with_binding_errors_are_not_rechecked() {
        let registry = registry();
        let order = registry.metadata_for_type("Order").expect("order");
        let mut state = ModelStateDictionary::new();
        state.add_model_error("Quantity", ModelError::conversion("bad number"));

        validator(&registry, &[])
            .validate(&json!({ "Reference": "R", "Quantity": 0 }), &order, "", &mut state)
            .expect("validated");

        let entry = state.get("Quantity").expect("entry");
        assert_eq!(entry.errors().len(), 1);
        assert_eq!(entry.errors()[0].message(), "bad number");
    }
}
