//! Model binding: metadata-driven recursive construction of models from
//! request values, with conversion errors collected in model state.

pub mod binders;
mod body;
mod context;
pub(crate) mod conversion;
mod error;
mod model_state;
mod service;
mod value_provider;

pub use binders::{CompositeModelBinder, ModelBinder};
pub use body::{BodyModelReader, BodyReadError, JsonBodyReader};
pub use context::{
    BindingOptions, ModelBindingContext, ModelBindingResult, OperationBindingContext,
    PropertyFilter, index_model_name, property_model_name,
};
pub use error::BindingError;
pub use model_state::{
    ModelError, ModelErrorKind, ModelStateDictionary, ModelStateEntry, ModelValidationState,
};
pub use service::{ActionArguments, BindingSources, ModelBindingService, ParameterDescriptor};
pub use value_provider::{
    CompositeValueProvider, DictionaryValueProvider, ValueProvider, ValueProviderResult,
};
