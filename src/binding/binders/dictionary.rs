use serde_json::{Map, Value};

use crate::binding::context::{
    ModelBindingContext, ModelBindingResult, OperationBindingContext, index_model_name,
};
use crate::binding::model_state::ModelStateDictionary;
use crate::metadata::ModelKind;

use super::{BindFuture, ModelBinder, reads_from_providers};

/// Binds string-keyed maps from `key[name]` entries.
pub struct DictionaryModelBinder;

impl ModelBinder for DictionaryModelBinder {
    fn bind_model<'a>(
        &'a self,
        context: &'a ModelBindingContext,
        operation: &'a OperationBindingContext<'a>,
        model_state: &'a mut ModelStateDictionary,
    ) -> BindFuture<'a> {
        Box::pin(async move {
            let ModelKind::Dictionary { value } = context.metadata.kind() else {
                return Ok(None);
            };
            if !reads_from_providers(context.marker.as_ref()) {
                return Ok(None);
            }
            let value_type = operation.metadata_provider.metadata_for_type(value)?;
            let keys = context.value_provider.child_keys(&context.model_name);
            if keys.is_empty() {
                return Ok(Some(if context.is_forced() {
                    ModelBindingResult::Bound(Value::Object(Map::new()))
                } else {
                    ModelBindingResult::NotBound
                }));
            }

            let mut entries = Map::new();
            for entry_key in keys {
                let model_name = index_model_name(&context.model_name, &entry_key);
                let child = context.child(
                    operation,
                    model_name,
                    &entry_key,
                    value_type.clone(),
                    None,
                );
                let result = operation
                    .binder
                    .bind_model(&child, operation, &mut *model_state)
                    .await?;
                if let Some(ModelBindingResult::Bound(value)) = result {
                    entries.insert(entry_key, value);
                }
            }
            Ok(Some(ModelBindingResult::Bound(Value::Object(entries))))
        })
    }
}
