pub mod model;
pub mod registry;
pub mod spec;
pub mod weights;

pub use model::{ModelEntity, Prediction, TaskKind};
pub use registry::{LayerBuilder, LayerRegistry};
pub use spec::{LayerDescriptor, LayerKind, ModelArchitecture, ParamValue};
pub use weights::WeightBlob;

use crate::error::{ArchitectureResult, ShapeError};
use crate::math::tensor::Tensor;

/// Builds an executable model from an architecture with the built-in registry.
pub fn build_model(architecture: &ModelArchitecture) -> ArchitectureResult<ModelEntity> {
    ModelEntity::build(architecture)
}

/// Inverse of `to_spec`; identical to `build_model`.
pub fn from_spec(architecture: &ModelArchitecture) -> ArchitectureResult<ModelEntity> {
    build_model(architecture)
}

pub fn to_spec(entity: &ModelEntity) -> ModelArchitecture {
    entity.to_spec()
}

pub fn forward(entity: &mut ModelEntity, input: &Tensor) -> Result<Tensor, ShapeError> {
    entity.forward(input)
}
