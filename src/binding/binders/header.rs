use serde_json::Value;

use crate::binding::context::{ModelBindingContext, ModelBindingResult, OperationBindingContext};
use crate::binding::model_state::ModelStateDictionary;
use crate::metadata::{BinderMarker, BindingSource, ModelKind};

use super::simple::convert_or_record;
use super::{BindFuture, ModelBinder};

/// Binds scalars and scalar collections from request headers.
///
/// Complex types are declined, which surfaces as binder-not-found.
pub struct HeaderModelBinder;

impl ModelBinder for HeaderModelBinder {
    fn bind_model<'a>(
        &'a self,
        context: &'a ModelBindingContext,
        operation: &'a OperationBindingContext<'a>,
        model_state: &'a mut ModelStateDictionary,
    ) -> BindFuture<'a> {
        Box::pin(async move {
            let Some(BinderMarker::FromHeader { name }) = context.marker.as_ref() else {
                return Ok(None);
            };
            let header = name.as_deref().unwrap_or(&context.field_name);
            let headers = operation.value_provider.filtered(BindingSource::Header);
            let key = context.model_name.as_str();

            match context.metadata.kind() {
                ModelKind::Scalar(kind) => {
                    let Some(result) = headers.get_value(header) else {
                        return Ok(Some(ModelBindingResult::Bound(
                            context.metadata.empty_value(),
                        )));
                    };
                    model_state.set_model_value(key, &result);
                    let raw = result.first().unwrap_or_default();
                    let value = convert_or_record(raw, *kind, &context.metadata, key, model_state);
                    Ok(Some(ModelBindingResult::Bound(value)))
                }
                ModelKind::Collection { element } => {
                    let element = operation.metadata_provider.metadata_for_type(element)?;
                    let Some(kind) = element.scalar_kind() else {
                        return Ok(None);
                    };
                    let Some(result) = headers.get_value(header) else {
                        return Ok(Some(ModelBindingResult::Bound(Value::Array(Vec::new()))));
                    };
                    model_state.set_model_value(key, &result);
                    let values = result
                        .values()
                        .iter()
                        .flat_map(|value| value.split(','))
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                        .map(|raw| convert_or_record(raw, kind, &element, key, model_state))
                        .collect();
                    Ok(Some(ModelBindingResult::Bound(Value::Array(values))))
                }
                _ => Ok(None),
            }
        })
    }
}
