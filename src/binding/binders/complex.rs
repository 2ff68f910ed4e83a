use serde_json::{Map, Value};
use tracing::trace;

use crate::binding::context::{
    ModelBindingContext, ModelBindingResult, OperationBindingContext, PropertyFilter,
    effective_marker, property_model_name,
};
use crate::binding::error::BindingError;
use crate::binding::model_state::ModelStateDictionary;
use crate::metadata::{BinderMarker, BindingSource, ModelMetadata, forces};

use super::{BindFuture, ModelBinder, reads_from_providers};

/// Binds complex types property by property.
pub struct ComplexObjectModelBinder;

impl ModelBinder for ComplexObjectModelBinder {
    fn bind_model<'a>(
        &'a self,
        context: &'a ModelBindingContext,
        operation: &'a OperationBindingContext<'a>,
        model_state: &'a mut ModelStateDictionary,
    ) -> BindFuture<'a> {
        Box::pin(async move {
            let metadata = &context.metadata;
            if !metadata.is_complex() || !reads_from_providers(context.marker.as_ref()) {
                return Ok(None);
            }
            if !should_bind(context, operation)? {
                trace!(
                    model_name = %context.model_name,
                    model_type = metadata.full_name(),
                    "No value or marker for complex model"
                );
                return Ok(Some(ModelBindingResult::NotBound));
            }

            let mut instance = match &context.model {
                Some(Value::Object(existing)) => existing.clone(),
                _ => new_instance(metadata, operation)?,
            };

            for property in metadata.properties() {
                if !context.property_filter.allows(property) {
                    continue;
                }
                let property_type = operation
                    .metadata_provider
                    .metadata_for_type(property.type_name())?;
                let marker = effective_marker(property, &property_type);
                let existing = instance
                    .get(property.name())
                    .filter(|value| !value.is_null())
                    .cloned();
                let child = context.child_with_marker(
                    operation,
                    property_model_name(&context.model_name, property.name()),
                    property.name(),
                    property_type,
                    marker,
                    existing,
                );
                if !should_attempt(&child, operation)? {
                    continue;
                }

                let result = operation
                    .binder
                    .bind_model(&child, operation, &mut *model_state)
                    .await?;
                if let Some(ModelBindingResult::Bound(value)) = result {
                    instance.insert(property.name().to_string(), value);
                }
            }

            Ok(Some(ModelBindingResult::Bound(Value::Object(instance))))
        })
    }
}

/// A complex node is visited when it is forced, is the root of an update,
/// has values under its prefix, or has a direct property that is forced or
/// can be read from the body. Forcing never flows from a container down.
fn should_bind(
    context: &ModelBindingContext,
    operation: &OperationBindingContext<'_>,
) -> Result<bool, BindingError> {
    if context.is_forced() {
        return Ok(true);
    }
    if context.is_top_level
        && (context.model.is_some() || context.property_filter.has_include_list())
    {
        return Ok(true);
    }
    if context.value_provider.contains_prefix(&context.model_name) {
        return Ok(true);
    }
    has_triggering_property(
        &context.metadata,
        &context.property_filter,
        operation,
        operation.body_reader.is_some(),
    )
}

/// A property is left at its current value unless something can supply it:
/// values under its key, a forcing marker, or a body or header marker.
/// Complex properties are also attempted when one of their own properties
/// would trigger binding.
fn should_attempt(
    child: &ModelBindingContext,
    operation: &OperationBindingContext<'_>,
) -> Result<bool, BindingError> {
    if child.is_forced() || !reads_from_providers(child.marker.as_ref()) {
        return Ok(true);
    }
    if child.value_provider.contains_prefix(&child.model_name) {
        return Ok(true);
    }
    if !child.metadata.is_complex() {
        return Ok(false);
    }
    has_triggering_property(
        &child.metadata,
        &child.property_filter,
        operation,
        operation.body_reader.is_some(),
    )
}

fn has_triggering_property(
    metadata: &ModelMetadata,
    filter: &PropertyFilter,
    operation: &OperationBindingContext<'_>,
    has_body: bool,
) -> Result<bool, BindingError> {
    for property in metadata.properties() {
        if !filter.allows(property) {
            continue;
        }
        let property_type = operation
            .metadata_provider
            .metadata_for_type(property.type_name())?;
        let marker = effective_marker(property, &property_type);
        if forces(marker.as_ref()) {
            return Ok(true);
        }
        let from_body =
            marker.as_ref().and_then(BinderMarker::source) == Some(BindingSource::Body);
        if from_body && has_body {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Fresh instance with every declared property at its type default.
pub(super) fn new_instance(
    metadata: &ModelMetadata,
    operation: &OperationBindingContext<'_>,
) -> Result<Map<String, Value>, BindingError> {
    let mut instance = Map::new();
    for property in metadata.properties() {
        let property_type = operation
            .metadata_provider
            .metadata_for_type(property.type_name())?;
        instance.insert(property.name().to_string(), property_type.default_value());
    }
    Ok(instance)
}
