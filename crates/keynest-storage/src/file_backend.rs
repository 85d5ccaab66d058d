//! Filesystem storage backend.
//!
//! Each blob is a single file under a root directory; `/` in a blob name maps
//! to a subdirectory. Writes go to a uniquely named temporary file next to the
//! target, are synced to disk, and are then renamed over the target, so a
//! reader never observes a half-written blob.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{StorageBackend, StorageError};

/// Marker embedded in temporary file names. Files carrying it are skipped by
/// [`list`](StorageBackend::list) and never returned as blobs.
const TMP_MARKER: &str = ".kntmp.";

/// A storage backend that keeps one file per blob under a root directory.
///
/// # Examples
///
/// ```no_run
/// # use keynest_storage::FileBackend;
/// # #[tokio::main]
/// # async fn main() {
/// let backend = FileBackend::open("/home/me/.keynest/local").await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
    tmp_counter: Arc<AtomicU64>,
    #[cfg(test)]
    fail_sync: Arc<std::sync::atomic::AtomicBool>,
}

impl FileBackend {
    /// Open a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the directory cannot be created.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::Open {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(root = %root.display(), "file storage opened");
        Ok(Self {
            root,
            tmp_counter: Arc::new(AtomicU64::new(0)),
            #[cfg(test)]
            fail_sync: Arc::default(),
        })
    }

    /// The directory this backend writes into.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidKey {
            key: key.to_owned(),
            reason: reason.to_owned(),
        };

        if key.is_empty() {
            return Err(invalid("name is empty"));
        }
        if key.contains('\\') || key.contains(TMP_MARKER) {
            return Err(invalid("name contains a reserved sequence"));
        }

        let relative = Path::new(key);
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(invalid("name must be a relative path without '.' or '..'"));
            }
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid("name contains an empty or relative segment"));
        }

        Ok(self.root.join(relative))
    }

    fn tmp_path(&self, target: &Path) -> PathBuf {
        let counter = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let file_name = target
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("blob");
        target.with_file_name(format!(
            "{file_name}{TMP_MARKER}{}.{counter}",
            std::process::id()
        ))
    }

    async fn write_atomic(&self, key: &str, target: &Path, value: &[u8]) -> Result<(), StorageError> {
        let write_err = |reason: String| StorageError::Write {
            key: key.to_owned(),
            reason,
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| write_err(format!("create directory: {e}")))?;
        }

        let tmp = self.tmp_path(target);
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)
            .await
            .map_err(|e| write_err(format!("create temp file: {e}")))?;

        // From here on the temp file exists and must not outlive a failure.
        let published = async {
            file.write_all(value)
                .await
                .map_err(|e| write_err(format!("write temp file: {e}")))?;
            self.sync(&file)
                .await
                .map_err(|e| write_err(format!("sync temp file: {e}")))?;
            drop(file);
            fs::rename(&tmp, target)
                .await
                .map_err(|e| write_err(format!("atomic rename: {e}")))
        }
        .await;

        if published.is_err() {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                warn!(tmp = %tmp.display(), error = %cleanup, "failed to remove temp file");
            }
        }
        published
    }

    async fn sync(&self, file: &fs::File) -> std::io::Result<()> {
        #[cfg(test)]
        if self.fail_sync.load(Ordering::Relaxed) {
            return Err(std::io::Error::other("injected sync failure"));
        }
        file.sync_all().await
    }
}

#[async_trait::async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        self.write_atomic(key, &path, value).await?;
        debug!(key, bytes = value.len(), "blob written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let list_err = |reason: String| StorageError::List {
            prefix: prefix.to_owned(),
            reason,
        };

        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(list_err(e.to_string())),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| list_err(e.to_string()))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| list_err(e.to_string()))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if !name.contains(TMP_MARKER) && name.starts_with(prefix) {
                    keys.push(name);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.resolve(key)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }
}
