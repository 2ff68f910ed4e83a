//! Model metadata: the descriptor table the binder and validator consult
//! instead of inspecting types directly.

mod markers;
mod model;
mod registry;

pub(crate) use markers::forces;
pub use markers::{BinderMarker, BindingSource};
pub use model::{
    ModelKind, ModelMetadata, ModelTypeId, PropertyMetadata, ScalarKind, ValidationRules,
};
pub use registry::{
    MetadataError, ModelMetadataProvider, TypeDefinition, TypeRegistry, TypeRegistryBuilder,
    builtin,
};
