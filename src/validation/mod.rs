//! Post-binding validation and the filters that prune it.

mod exclude;
mod validator;

pub use exclude::{
    ActivationError, ExcludeFilterOptions, ExcludeFilters, ExcludeTypeValidationFilter,
    ExcludeValidationDescriptor, TypeBasedExcludeFilter, TypeNameBasedExcludeFilter,
};
pub use validator::ModelValidator;
