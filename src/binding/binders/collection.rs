use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::binding::context::{
    ModelBindingContext, ModelBindingResult, OperationBindingContext, index_model_name,
};
use crate::binding::error::BindingError;
use crate::binding::model_state::ModelStateDictionary;
use crate::metadata::{ModelKind, ModelMetadata};

use super::simple::convert_or_record;
use super::{BindFuture, ModelBinder, reads_from_providers};

/// Binds sequences.
///
/// Scalar elements may arrive as repeated values of one key
/// (`tags=a&tags=b`). Otherwise elements are read from `key[0]`, `key[1]`, …
/// until the first index with no values, or from the indices listed under
/// `key.index`. The gap check runs before an element is bound, so element
/// types marked always-bind do not extend the sequence.
pub struct CollectionModelBinder;

impl ModelBinder for CollectionModelBinder {
    fn bind_model<'a>(
        &'a self,
        context: &'a ModelBindingContext,
        operation: &'a OperationBindingContext<'a>,
        model_state: &'a mut ModelStateDictionary,
    ) -> BindFuture<'a> {
        Box::pin(async move {
            let ModelKind::Collection { element } = context.metadata.kind() else {
                return Ok(None);
            };
            if !reads_from_providers(context.marker.as_ref()) {
                return Ok(None);
            }
            let element = operation.metadata_provider.metadata_for_type(element)?;
            let key = context.model_name.as_str();

            if let Some(kind) = element.scalar_kind()
                && let Some(result) = context.value_provider.get_value(key)
            {
                model_state.set_model_value(key, &result);
                let values = result
                    .values()
                    .iter()
                    .map(|raw| convert_or_record(raw, kind, &element, key, model_state))
                    .collect();
                return Ok(Some(ModelBindingResult::Bound(Value::Array(values))));
            }

            let explicit = context.value_provider.get_value(&format!("{key}.index"));
            let mut items = Vec::new();
            match &explicit {
                Some(indices) => {
                    for index in indices.values() {
                        let element_key = index_model_name(key, index);
                        if let Some(value) =
                            bind_element(context, operation, model_state, &element, element_key)
                                .await?
                        {
                            items.push(value);
                        }
                    }
                }
                None => {
                    for index in 0_usize.. {
                        let element_key = index_model_name(key, index);
                        if !context.value_provider.contains_prefix(&element_key) {
                            trace!(model_name = key, index, "Collection ends at first gap");
                            break;
                        }
                        match bind_element(context, operation, model_state, &element, element_key)
                            .await?
                        {
                            Some(value) => items.push(value),
                            None => break,
                        }
                    }
                }
            }

            if items.is_empty() && explicit.is_none() && !context.is_forced() {
                return Ok(Some(ModelBindingResult::NotBound));
            }
            Ok(Some(ModelBindingResult::Bound(Value::Array(items))))
        })
    }
}

async fn bind_element(
    context: &ModelBindingContext,
    operation: &OperationBindingContext<'_>,
    model_state: &mut ModelStateDictionary,
    element: &Arc<ModelMetadata>,
    element_key: String,
) -> Result<Option<Value>, BindingError> {
    let field_name = element_key.clone();
    let child = context.child(
        operation,
        element_key,
        &field_name,
        Arc::clone(element),
        None,
    );
    let result = operation
        .binder
        .bind_model(&child, operation, model_state)
        .await?;
    Ok(result.and_then(ModelBindingResult::into_value))
}
