use serde_json::Value;
use tracing::debug;

use crate::binding::context::{ModelBindingContext, ModelBindingResult, OperationBindingContext};
use crate::binding::conversion::convert_scalar;
use crate::binding::model_state::{ModelError, ModelStateDictionary};
use crate::metadata::{ModelMetadata, ScalarKind};

use super::{BindFuture, ModelBinder, reads_from_providers};

/// Binds scalars from the first value under the node's key.
pub struct SimpleTypeModelBinder;

impl ModelBinder for SimpleTypeModelBinder {
    fn bind_model<'a>(
        &'a self,
        context: &'a ModelBindingContext,
        _operation: &'a OperationBindingContext<'a>,
        model_state: &'a mut ModelStateDictionary,
    ) -> BindFuture<'a> {
        Box::pin(async move {
            let Some(kind) = context.metadata.scalar_kind() else {
                return Ok(None);
            };
            if !reads_from_providers(context.marker.as_ref()) {
                return Ok(None);
            }

            let key = context.model_name.as_str();
            let Some(result) = context.value_provider.get_value(key) else {
                if context.is_forced() {
                    return Ok(Some(ModelBindingResult::Bound(
                        context.metadata.empty_value(),
                    )));
                }
                return Ok(Some(ModelBindingResult::NotBound));
            };

            model_state.set_model_value(key, &result);
            let raw = result.first().unwrap_or_default();
            let value = convert_or_record(raw, kind, &context.metadata, key, model_state);
            Ok(Some(ModelBindingResult::Bound(value)))
        })
    }
}

/// Convert `raw`; on failure record the error at `key` and fall back to the
/// type default so sibling nodes keep binding.
pub(super) fn convert_or_record(
    raw: &str,
    kind: ScalarKind,
    metadata: &ModelMetadata,
    key: &str,
    model_state: &mut ModelStateDictionary,
) -> Value {
    match convert_scalar(raw, kind, metadata, key) {
        Ok(value) => value,
        Err(message) => {
            debug!(
                model_name = key,
                model_type = metadata.full_name(),
                scalar_kind = kind.as_str(),
                "Value conversion failed"
            );
            model_state.add_model_error(key, ModelError::conversion(message));
            metadata.default_value()
        }
    }
}
