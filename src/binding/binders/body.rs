use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::binding::context::{
    ModelBindingContext, ModelBindingResult, OperationBindingContext, index_model_name,
    property_model_name,
};
use crate::binding::error::BindingError;
use crate::binding::model_state::{ModelError, ModelStateDictionary};
use crate::metadata::{BinderMarker, ModelKind, ModelMetadata, ScalarKind};

use super::complex::new_instance;
use super::simple::convert_or_record;
use super::{BindFuture, ModelBinder};

/// Resolves body-marked nodes in one step from the body reader.
///
/// Properties of the body model are never visited individually, so their
/// own markers have no effect.
pub struct BodyModelBinder;

impl ModelBinder for BodyModelBinder {
    fn bind_model<'a>(
        &'a self,
        context: &'a ModelBindingContext,
        operation: &'a OperationBindingContext<'a>,
        model_state: &'a mut ModelStateDictionary,
    ) -> BindFuture<'a> {
        Box::pin(async move {
            let Some(BinderMarker::FromBody { force_bind }) = context.marker.as_ref() else {
                return Ok(None);
            };

            let read = match operation.body_reader {
                Some(reader) => reader.read(&context.metadata).await,
                None => Ok(None),
            };

            match read {
                Ok(Some(value)) => {
                    debug!(
                        model_name = %context.model_name,
                        model_type = context.metadata.full_name(),
                        "Model read from request body"
                    );
                    let value = coerce(
                        value,
                        &context.metadata,
                        &context.model_name,
                        operation,
                        model_state,
                    )?;
                    Ok(Some(ModelBindingResult::Bound(value)))
                }
                Ok(None) if *force_bind => {
                    let value = if context.metadata.is_complex() {
                        Value::Object(new_instance(&context.metadata, operation)?)
                    } else {
                        context.metadata.empty_value()
                    };
                    Ok(Some(ModelBindingResult::Bound(value)))
                }
                Ok(None) => Ok(Some(ModelBindingResult::Bound(Value::Null))),
                Err(err) => {
                    warn!(
                        model_name = %context.model_name,
                        model_type = context.metadata.full_name(),
                        error = %err,
                        "Request body could not be read"
                    );
                    model_state
                        .add_model_error(&context.model_name, ModelError::body(err.to_string()));
                    Ok(Some(ModelBindingResult::Bound(Value::Null)))
                }
            }
        })
    }
}

/// Conform a deserialized body to the declared type tree.
///
/// Scalars go through the same conversion as provider values. Mismatches are
/// recorded at the key of the offending node, which then falls back to its
/// type default. Properties missing from the body get their defaults and
/// undeclared members are dropped.
fn coerce(
    value: Value,
    metadata: &ModelMetadata,
    key: &str,
    operation: &OperationBindingContext<'_>,
    model_state: &mut ModelStateDictionary,
) -> Result<Value, BindingError> {
    match (metadata.kind(), value) {
        (ModelKind::Scalar(kind), value) => {
            let raw = match value {
                Value::String(raw) => raw,
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null if metadata.is_nullable() || *kind == ScalarKind::Text => {
                    return Ok(Value::Null);
                }
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => {
                    return Ok(mismatch(metadata, key, model_state));
                }
            };
            Ok(convert_or_record(&raw, *kind, metadata, key, model_state))
        }
        (_, Value::Null) => Ok(Value::Null),
        (ModelKind::Complex, Value::Object(mut members)) => {
            let mut instance = Map::new();
            for property in metadata.properties() {
                let property_type = operation
                    .metadata_provider
                    .metadata_for_type(property.type_name())?;
                let member = take_member(&mut members, property.name());
                let value = match member {
                    Some(member) => coerce(
                        member,
                        &property_type,
                        &property_model_name(key, property.name()),
                        operation,
                        model_state,
                    )?,
                    None => property_type.default_value(),
                };
                instance.insert(property.name().to_string(), value);
            }
            Ok(Value::Object(instance))
        }
        (ModelKind::Collection { element }, Value::Array(items)) => {
            let element = operation.metadata_provider.metadata_for_type(element)?;
            let mut coerced = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                let item_key = index_model_name(key, index);
                coerced.push(coerce(item, &element, &item_key, operation, model_state)?);
            }
            Ok(Value::Array(coerced))
        }
        (ModelKind::Dictionary { value }, Value::Object(entries)) => {
            let value_type = operation.metadata_provider.metadata_for_type(value)?;
            let mut coerced = Map::new();
            for (entry_key, entry) in entries {
                let entry_model_name = index_model_name(key, &entry_key);
                let entry = coerce(entry, &value_type, &entry_model_name, operation, model_state)?;
                coerced.insert(entry_key, entry);
            }
            Ok(Value::Object(coerced))
        }
        (ModelKind::Opaque, value) => Ok(value),
        (_, _) => Ok(mismatch(metadata, key, model_state)),
    }
}

/// Member named `name`, matched exactly first and then ignoring ASCII case.
fn take_member(members: &mut Map<String, Value>, name: &str) -> Option<Value> {
    if let Some(value) = members.remove(name) {
        return Some(value);
    }
    let found = members
        .keys()
        .find(|member| member.eq_ignore_ascii_case(name))
        .cloned()?;
    members.remove(&found)
}

fn mismatch(metadata: &ModelMetadata, key: &str, model_state: &mut ModelStateDictionary) -> Value {
    debug!(
        model_name = key,
        model_type = metadata.full_name(),
        "Body value has the wrong shape"
    );
    model_state.add_model_error(
        key,
        ModelError::body(format!(
            "The request body value is not a valid `{}`.",
            metadata.full_name()
        )),
    );
    metadata.default_value()
}
