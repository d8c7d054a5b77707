pub mod activation;
pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod layers;
pub mod logging;
pub mod loss;
pub mod math;
pub mod network;
pub mod optim;
pub mod storage;
pub mod train;

// Convenience re-exports
pub use activation::activation::ActivationFunction;
pub use app::Workbench;
pub use config::AppConfig;
pub use data::{Batch, BatchSource, InMemoryDataset};
pub use error::{ArchitectureError, DataError, PoolError, ShapeError, StoreError, TrainingError};
pub use loss::LossType;
pub use math::tensor::Tensor;
pub use network::{build_model, from_spec, to_spec, forward};
pub use network::{LayerDescriptor, LayerKind, LayerRegistry, ModelArchitecture, ModelEntity, ParamValue, Prediction, TaskKind};
pub use optim::OptimizerType;
pub use storage::{ConnectionPool, ModelStore, ModelSummary, PoolConfig};
pub use train::{Hyperparameters, TrainingEngine, TrainingEvent, TrainingHistory, TrainingState};
