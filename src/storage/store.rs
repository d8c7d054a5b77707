//! Model persistence: architecture rows in SQLite, parameters as weight
//! files next to the database.
//!
//! A save writes the row first (marked `pending`), then the weight file, then
//! flips the row to `committed`. The two stores are not transactional with
//! each other; `weights_status` records how far a save got.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{ArchitectureError, StoreError, StoreResult};
use crate::network::model::ModelEntity;
use crate::network::spec::ModelArchitecture;
use crate::network::weights::{WeightBlob, WEIGHTS_FORMAT_VERSION};
use crate::storage::pool::ConnectionPool;
use crate::storage::record::{ModelRecord, ModelSummary, WeightsStatus};
use crate::storage::schema;

pub struct ModelStore {
    pool: Arc<ConnectionPool>,
    weights_dir: PathBuf,
}

impl ModelStore {
    /// Runs schema migrations and prepares the weight directory.
    pub fn new(pool: Arc<ConnectionPool>, weights_dir: impl Into<PathBuf>) -> StoreResult<ModelStore> {
        let weights_dir = weights_dir.into();
        fs::create_dir_all(&weights_dir)
            .map_err(|source| StoreError::WeightIo { path: weights_dir.clone(), source })?;
        pool.with_connection(|conn| -> StoreResult<()> { Ok(schema::migrate(conn)?) })?;
        Ok(ModelStore { pool, weights_dir })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn weights_dir(&self) -> &Path {
        &self.weights_dir
    }

    /// Location of the weight file for `(user_id, name)`.
    pub fn weights_path(&self, user_id: i64, name: &str) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.weights_dir.join(format!("{}_{}.weights", user_id, name)))
    }

    /// Creates a user row and returns its id.
    pub fn register_user(&self, username: &str) -> StoreResult<i64> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::UserRejected(username.to_owned()));
        }
        self.pool.with_connection(|conn| -> StoreResult<i64> {
            match conn.execute("INSERT INTO users (username) VALUES (?1)", params![username]) {
                Ok(_) => {
                    let id = conn.last_insert_rowid();
                    info!(user_id = id, username, "registered user");
                    Ok(id)
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::UserRejected(username.to_owned()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn find_user(&self, username: &str) -> StoreResult<Option<i64>> {
        self.pool.with_connection(|conn| -> StoreResult<Option<i64>> {
            Ok(conn
                .query_row("SELECT id FROM users WHERE username = ?1", params![username.trim()], |r| r.get(0))
                .optional()?)
        })
    }

    /// Checks up front that a save under `(user_id, name)` can succeed: the
    /// name yields a weight path and the user exists.
    pub fn check_save_target(&self, user_id: i64, name: &str) -> StoreResult<()> {
        validate_name(name)?;
        let known = self.pool.with_connection(|conn| -> StoreResult<bool> {
            Ok(conn.query_row("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", params![user_id], |r| r.get(0))?)
        })?;
        if !known {
            return Err(StoreError::UnknownUser(user_id));
        }
        Ok(())
    }

    /// Saves `entity` under `name` for `user_id`, overwriting any earlier
    /// save with the same owner and name. Returns the row id.
    pub fn save(&self, entity: &ModelEntity, name: &str, user_id: Option<i64>) -> StoreResult<i64> {
        let user_id = user_id.ok_or(StoreError::MissingOwner)?;
        let path = self.weights_path(user_id, name)?;
        let architecture = entity.to_spec().to_json()?;

        let id = self.pool.with_connection(|conn| -> StoreResult<i64> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM models WHERE user_id = ?1 AND name = ?2 ORDER BY id DESC LIMIT 1",
                    params![user_id, name],
                    |r| r.get(0),
                )
                .optional()?;
            let id = match existing {
                Some(id) => {
                    // created_at doubles as "last modified".
                    tx.execute(
                        "UPDATE models
                         SET architecture = ?1, parameters = '{}', weights_status = ?2,
                             created_at = strftime('%s', 'now')
                         WHERE id = ?3",
                        params![architecture, WeightsStatus::Pending, id],
                    )?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO models (user_id, name, architecture, parameters, weights_status)
                         VALUES (?1, ?2, ?3, '{}', ?4)",
                        params![user_id, name, architecture, WeightsStatus::Pending],
                    )?;
                    tx.last_insert_rowid()
                }
            };
            tx.commit()?;
            Ok(id)
        })?;
        debug!(model_id = id, user_id, name, "model row written");

        WeightBlob::new(entity.state_dict())
            .write_to(&path)
            .map_err(|source| StoreError::WeightIo { path: path.clone(), source })?;

        self.pool.with_connection(|conn| -> StoreResult<()> {
            conn.execute(
                "UPDATE models SET weights_status = ?1 WHERE id = ?2",
                params![WeightsStatus::Committed, id],
            )?;
            Ok(())
        })?;
        info!(model_id = id, user_id, name, path = %path.display(), "model saved");
        Ok(id)
    }

    /// Fetches a row. With `Some(user_id)` the row must belong to that user;
    /// a missing row and a foreign row are reported identically.
    pub fn load_record(&self, model_id: i64, user_id: Option<i64>) -> StoreResult<ModelRecord> {
        let record = self.pool.with_connection(|conn| -> StoreResult<Option<ModelRecord>> {
            Ok(conn
                .query_row(
                    "SELECT id, user_id, name, architecture, parameters, weights_status, created_at
                     FROM models WHERE id = ?1",
                    params![model_id],
                    |r| {
                        Ok(ModelRecord {
                            id: r.get(0)?,
                            user_id: r.get(1)?,
                            name: r.get(2)?,
                            architecture: r.get(3)?,
                            parameters: r.get(4)?,
                            weights_status: r.get(5)?,
                            created_at: r.get(6)?,
                        })
                    },
                )
                .optional()?)
        })?;

        match record {
            Some(record) if user_id.map_or(true, |uid| record.user_id == Some(uid)) => Ok(record),
            _ => Err(StoreError::NotFoundOrForbidden { model_id }),
        }
    }

    /// Rebuilds the model from its stored architecture. Parameters come back
    /// freshly initialised; call `load_weights` for the trained values.
    pub fn load(&self, model_id: i64, user_id: Option<i64>) -> StoreResult<ModelEntity> {
        let record = self.load_record(model_id, user_id)?;
        let architecture = ModelArchitecture::from_json(&record.architecture)?;
        Ok(ModelEntity::build(&architecture)?)
    }

    /// Copies the saved parameters for `(user_id, name)` into `entity`.
    pub fn load_weights(&self, entity: &mut ModelEntity, user_id: i64, name: &str) -> StoreResult<()> {
        let path = self.weights_path(user_id, name)?;
        let blob = WeightBlob::read_from(&path).map_err(|e| match *e {
            bincode::ErrorKind::Io(source) => StoreError::WeightIo { path: path.clone(), source },
            other => StoreError::WeightCodec { path: path.clone(), source: Box::new(other) },
        })?;
        if blob.format_version != WEIGHTS_FORMAT_VERSION {
            return Err(ArchitectureError::WeightMismatch(format!(
                "format version {} is not supported (expected {})",
                blob.format_version, WEIGHTS_FORMAT_VERSION
            ))
            .into());
        }
        entity.load_state_dict(&blob.tensors)?;
        debug!(user_id, name, "weights loaded");
        Ok(())
    }

    /// Summaries, most recently saved first. `None` lists every user's models.
    pub fn list(&self, user_id: Option<i64>) -> StoreResult<Vec<ModelSummary>> {
        self.pool.with_connection(|conn| -> StoreResult<Vec<ModelSummary>> {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, created_at FROM models
                 WHERE ?1 IS NULL OR user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt.query_map(params![user_id], |r| {
                Ok(ModelSummary {
                    id: r.get(0)?,
                    user_id: r.get(1)?,
                    name: r.get(2)?,
                    created_at: r.get(3)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    let bad = name.trim().is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.contains('\0');
    if bad {
        return Err(StoreError::InvalidName(name.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::spec::{LayerDescriptor, LayerKind};
    use crate::storage::pool::PoolConfig;

    fn store(dir: &tempfile::TempDir) -> ModelStore {
        let pool = ConnectionPool::open(PoolConfig::new(dir.path().join("store.db"))).unwrap();
        ModelStore::new(Arc::new(pool), dir.path().join("weights")).unwrap()
    }

    fn model() -> ModelEntity {
        ModelEntity::build(&ModelArchitecture::new(vec![
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 3).with("out_features", 2),
            LayerDescriptor::new(LayerKind::Sigmoid),
        ]))
        .unwrap()
    }

    #[test]
    fn save_requires_owner() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir).save(&model(), "m", None).unwrap_err();
        assert!(matches!(err, StoreError::MissingOwner));
    }

    #[test]
    fn save_marks_row_committed_and_writes_weights() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let uid = store.register_user("ada").unwrap();
        let id = store.save(&model(), "m", Some(uid)).unwrap();

        let record = store.load_record(id, Some(uid)).unwrap();
        assert_eq!(record.weights_status, WeightsStatus::Committed);
        assert_eq!(record.parameters, "{}");
        assert!(store.weights_path(uid, "m").unwrap().exists());
    }

    #[test]
    fn failed_blob_write_leaves_row_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let uid = store.register_user("ada").unwrap();
        // A directory squatting on the weight path makes the final rename fail.
        fs::create_dir(store.weights_path(uid, "m").unwrap()).unwrap();

        let err = store.save(&model(), "m", Some(uid)).unwrap_err();
        assert!(matches!(err, StoreError::WeightIo { .. }), "{}", err);

        let rows = store.list(Some(uid)).unwrap();
        assert_eq!(rows.len(), 1);
        let record = store.load_record(rows[0].id, Some(uid)).unwrap();
        assert_eq!(record.weights_status, WeightsStatus::Pending);
    }

    #[test]
    fn concurrent_saves_of_one_name_all_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let uid = store.register_user("ada").unwrap();

        let ids: Vec<i64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| store.save(&model(), "shared", Some(uid)).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.iter().all(|&id| id == ids[0]));
        let record = store.load_record(ids[0], Some(uid)).unwrap();
        assert_eq!(record.weights_status, WeightsStatus::Committed);
        let mut reloaded = model();
        store.load_weights(&mut reloaded, uid, "shared").unwrap();
    }

    #[test]
    fn resave_overwrites_the_same_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let uid = store.register_user("ada").unwrap();
        let first = store.save(&model(), "m", Some(uid)).unwrap();
        let second = store.save(&model(), "m", Some(uid)).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list(Some(uid)).unwrap().len(), 1);
    }

    #[test]
    fn unknown_owner_violates_foreign_key() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir).save(&model(), "m", Some(42)).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn path_like_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let uid = store.register_user("ada").unwrap();
        for name in ["../escape", "a/b", "a\\b", ""] {
            assert!(matches!(
                store.save(&model(), name, Some(uid)),
                Err(StoreError::InvalidName(_))
            ));
        }
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn save_target_is_checked_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let uid = store.register_user("ada").unwrap();

        assert!(store.check_save_target(uid, "m").is_ok());
        assert!(matches!(store.check_save_target(uid, "a/b"), Err(StoreError::InvalidName(_))));
        assert!(matches!(store.check_save_target(uid + 1, "m"), Err(StoreError::UnknownUser(id)) if id == uid + 1));
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let uid = store.register_user("ada").unwrap();
        assert!(matches!(store.register_user("ada"), Err(StoreError::UserRejected(_))));
        assert!(matches!(store.register_user("  "), Err(StoreError::UserRejected(_))));
        assert_eq!(store.find_user("ada").unwrap(), Some(uid));
        assert_eq!(store.find_user("bob").unwrap(), None);
    }

    #[test]
    fn missing_weight_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut m = model();
        assert!(matches!(store.load_weights(&mut m, 1, "nothing"), Err(StoreError::WeightIo { .. })));
    }

    #[test]
    fn weights_for_another_architecture_do_not_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let uid = store.register_user("ada").unwrap();
        store.save(&model(), "m", Some(uid)).unwrap();

        let mut other = ModelEntity::build(&ModelArchitecture::new(vec![
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 5).with("out_features", 2),
        ]))
        .unwrap();
        assert!(matches!(
            store.load_weights(&mut other, uid, "m"),
            Err(StoreError::Architecture(ArchitectureError::WeightMismatch(_)))
        ));
    }
}
