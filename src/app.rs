use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::error::StoreResult;
use crate::storage::pool::ConnectionPool;
use crate::storage::store::ModelStore;

/// Process-wide resources, built once at startup and passed to whoever
/// needs them.
pub struct Workbench {
    pub config: AppConfig,
    pub pool: Arc<ConnectionPool>,
    pub store: ModelStore,
}

impl Workbench {
    /// Opens the pool, migrates the schema and prepares the weight directory.
    pub fn init(config: AppConfig) -> StoreResult<Workbench> {
        let pool = Arc::new(ConnectionPool::open(config.database.pool_config())?);
        let store = ModelStore::new(Arc::clone(&pool), config.storage.weights_dir.clone())?;
        info!(database = %config.database.path.display(), "workbench ready");
        Ok(Workbench { config, pool, store })
    }

    pub fn shutdown(self) {
        self.pool.close_all();
        info!("workbench shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.path = dir.path().join("app.db");
        config.database.pool_size = 2;
        config.storage.weights_dir = dir.path().join("weights");

        let app = Workbench::init(config).unwrap();
        assert_eq!(app.pool.idle_count(), 2);
        assert!(app.store.list(None).unwrap().is_empty());
        assert!(dir.path().join("weights").is_dir());

        let pool = Arc::clone(&app.pool);
        app.shutdown();
        assert_eq!(pool.idle_count(), 0);
    }
}
