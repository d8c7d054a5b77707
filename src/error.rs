//! Error types for every layer of the workbench.
//!
//! Architecture, tensor and persistence errors are returned synchronously.
//! Training errors never reach the caller's thread as a `Result`; they are
//! rendered into the terminal `TrainingEvent::Failed` message instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::network::spec::LayerKind;

/// Shape problems raised by tensor math and by layer forward/backward passes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    /// Two operands (or an operand and a layer) disagree on shape.
    #[error("{op}: expected shape {expected:?}, got {actual:?}")]
    Mismatch {
        op: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The operand has the wrong number of dimensions.
    #[error("{op}: expected a {expected}-d tensor, got shape {actual:?}")]
    Rank {
        op: &'static str,
        expected: usize,
        actual: Vec<usize>,
    },

    /// A flat buffer cannot be viewed with the requested shape.
    #[error("cannot view {len} values as shape {shape:?}")]
    Size { len: usize, shape: Vec<usize> },

    /// Geometry that produces an empty output (e.g. kernel larger than input).
    #[error("{op}: {reason}")]
    Geometry { op: &'static str, reason: String },

    /// Targets that the loss cannot interpret (e.g. class index out of range).
    #[error("{op}: {reason}")]
    Target { op: &'static str, reason: String },

    /// `backward` was called before any `forward` populated the cache.
    #[error("{op}: backward called without a cached forward pass")]
    NoForwardCache { op: &'static str },
}

/// Errors raised while parsing an architecture or building modules from it.
#[derive(Debug, Error)]
pub enum ArchitectureError {
    /// The tag is not one of the fixed layer kinds, or the registry has no
    /// builder for it.
    #[error("unsupported layer kind '{0}'")]
    UnsupportedLayerKind(String),

    /// The builder rejected the descriptor's params.
    #[error("invalid params for layer {index} ({kind}): {reason}")]
    InvalidLayerParams {
        index: usize,
        kind: LayerKind,
        reason: String,
    },

    /// The JSON document does not have the `{"layers": [...]}` shape.
    #[error("malformed architecture JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A weight snapshot does not fit the entity it is loaded into.
    #[error("weight snapshot does not match the model: {0}")]
    WeightMismatch(String),
}

/// Result type for architecture operations.
pub type ArchitectureResult<T> = std::result::Result<T, ArchitectureError>;

/// Errors raised by the connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Opening (or re-opening) a connection failed.
    #[error("failed to open database '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A freshly opened connection could not be configured.
    #[error("failed to configure connection to '{path}': {source}")]
    Configure {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// `pool_size` must be at least one.
    #[error("pool size must be at least 1")]
    ZeroSize,
}

/// Errors raised by the persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `save` was called without an owning user.
    #[error("a user id is required to save a model")]
    MissingOwner,

    /// The row does not exist or belongs to another user. The two cases are
    /// deliberately reported the same way.
    #[error("model {model_id} not found or not accessible")]
    NotFoundOrForbidden { model_id: i64 },

    /// The model name cannot be used to derive a weight path.
    #[error("invalid model name '{0}'")]
    InvalidName(String),

    /// No user row has this id.
    #[error("unknown user {0}")]
    UnknownUser(i64),

    /// The username is empty or already taken.
    #[error("cannot register user '{0}'")]
    UserRejected(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Architecture(#[from] ArchitectureError),

    #[error("failed to encode architecture: {0}")]
    Encode(#[from] serde_json::Error),

    /// Reading or writing the weight blob failed.
    #[error("weight file {path}: {source}")]
    WeightIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The weight blob could not be (de)serialized.
    #[error("weight file {path}: {source}")]
    WeightCodec {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
}

/// Result type for persistence operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the training engine.
///
/// Only `AlreadyRunning` is returned synchronously (from `start`); the rest
/// end a run and are reported through `TrainingEvent::Failed`.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("a training run is already in progress")]
    AlreadyRunning,

    #[error("epochs must be at least 1")]
    NoEpochs,

    #[error("training data source yielded no batches")]
    EmptyTrainingSource,

    #[error("batch {batch} of epoch {epoch}: {source}")]
    Batch {
        epoch: usize,
        batch: usize,
        #[source]
        source: ShapeError,
    },

    #[error("failed to spawn training worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors raised by the bundled data-loading helpers.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("row {row}: {reason}")]
    Row { row: usize, reason: String },

    #[error("dataset is empty")]
    Empty,

    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("inputs and targets differ in length ({inputs} vs {targets})")]
    LengthMismatch { inputs: usize, targets: usize },

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors raised while loading the application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let err = StoreError::MissingOwner;
        assert_eq!(err.to_string(), "a user id is required to save a model");

        let err = StoreError::NotFoundOrForbidden { model_id: 5 };
        assert!(err.to_string().contains("model 5"));

        let err = ArchitectureError::UnsupportedLayerKind("Dropout".into());
        assert_eq!(err.to_string(), "unsupported layer kind 'Dropout'");

        let err = ShapeError::Mismatch {
            op: "linear",
            expected: vec![2, 4],
            actual: vec![2, 3],
        };
        assert!(err.to_string().starts_with("linear:"));
    }
}
