pub mod pool;
pub mod record;
pub mod schema;
pub mod store;

pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use record::{ModelRecord, ModelSummary, WeightsStatus};
pub use store::ModelStore;
