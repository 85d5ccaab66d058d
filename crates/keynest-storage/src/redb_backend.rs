//! redb storage backend.
//!
//! Keeps every blob in one table of a single-file redb database. Each `put`
//! and `delete` commits its own write transaction, which gives the atomic
//! replace guarantee without temp files. Feature-gated behind `redb-backend`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::{StorageBackend, StorageError};

const BLOB_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

/// A storage backend backed by a redb database file.
///
/// Blocking redb calls run on the Tokio blocking pool.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn txn_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or created,
    /// or [`StorageError::Transaction`] if the blob table cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let txn = db.begin_write().map_err(txn_err)?;
        {
            // Opening inside a write transaction creates the table.
            let _table = txn.open_table(BLOB_TABLE).map_err(txn_err)?;
        }
        txn.commit().map_err(txn_err)?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Filesystem path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| txn_err(format!("blocking task failed: {e}")))?
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(txn_err)?;
            let table = txn.open_table(BLOB_TABLE).map_err(txn_err)?;
            let value = table
                .get(key.as_str())
                .map_err(|e| StorageError::Read {
                    key: key.clone(),
                    reason: e.to_string(),
                })?
                .map(|v| v.value().to_vec());
            Ok(value)
        })
        .await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let key = key.to_owned();
        let value = value.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(BLOB_TABLE).map_err(txn_err)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| StorageError::Write {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(txn_err)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_owned();
        self.blocking(move |db| {
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(BLOB_TABLE).map_err(txn_err)?;
                table
                    .remove(key.as_str())
                    .map_err(|e| StorageError::Delete {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(txn_err)
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.to_owned();
        self.blocking(move |db| {
            let list_err = |e: &dyn std::fmt::Display| StorageError::List {
                prefix: prefix.clone(),
                reason: e.to_string(),
            };
            let txn = db.begin_read().map_err(txn_err)?;
            let table = txn.open_table(BLOB_TABLE).map_err(txn_err)?;
            let mut keys = Vec::new();
            for item in table.range(prefix.as_str()..).map_err(|e| list_err(&e))? {
                let (k, _) = item.map_err(|e| list_err(&e))?;
                let name = k.value();
                if !name.starts_with(prefix.as_str()) {
                    break;
                }
                keys.push(name.to_owned());
            }
            Ok(keys)
        })
        .await
    }
}
