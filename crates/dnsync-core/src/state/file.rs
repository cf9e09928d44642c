// # File State Store
//
// Directory-backed implementation of StateStore: one file per key, holding
// the raw value with no framing.
//
// ## Crash Safety
//
// - Atomic writes: value written to a temporary sibling, synced, then renamed
// - The directory is synced after the rename so the new entry survives a crash
// - A missing file is "never written", not an error
// - Any other read failure (permissions, invalid UTF-8) is a StateStore error

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::traits::state_store::StateStore;

/// File-based state store
///
/// # Example
///
/// ```rust,no_run
/// use dnsync_core::state::FileStateStore;
/// use dnsync_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("data").await?;
///
///     store.set("last_ip.txt", "1.2.3.4").await?;
///     assert_eq!(store.get("last_ip.txt").await?, Some("1.2.3.4".to_string()));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Open a state directory, creating it if needed
    pub async fn new<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();

        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(&dir).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self { dir })
    }

    /// Directory holding the state files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf, Error> {
        if key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key == "."
            || key == ".."
        {
            return Err(Error::invalid_input(format!(
                "State key is not a plain file name: {:?}",
                key
            )));
        }
        Ok(self.dir.join(key))
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.tmp", key))
    }

    /// Flush the directory entry table to disk
    #[cfg(unix)]
    async fn sync_dir(&self) -> Result<(), Error> {
        let dir = if self.dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            self.dir.as_path()
        };

        let handle = fs::File::open(dir).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to open state directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        handle.sync_all().await.map_err(|e| {
            Error::state_store(format!(
                "Failed to sync state directory {}: {}",
                dir.display(),
                e
            ))
        })
    }

    // No portable directory sync off unix
    #[cfg(not(unix))]
    async fn sync_dir(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let path = self.path_for(key)?;

        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::trace!("State file does not exist: {}", path.display());
                Ok(None)
            }
            Err(e) => Err(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let path = self.path_for(key)?;
        let temp_path = self.temp_path(key);

        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(value.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        fs::rename(&temp_path, &path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        self.sync_dir().await?;

        tracing::trace!("State written to file: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_key_reads_as_none() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        assert_eq!(store.get("last_ip.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_value_survives_reopen() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        store.set("last_ip.txt", "1.2.3.4").await.unwrap();
        assert_eq!(
            store.get("last_ip.txt").await.unwrap(),
            Some("1.2.3.4".to_string())
        );

        // Raw value, no framing
        let raw = fs::read_to_string(dir.path().join("last_ip.txt")).await.unwrap();
        assert_eq!(raw, "1.2.3.4");

        let reopened = FileStateStore::new(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("last_ip.txt").await.unwrap(),
            Some("1.2.3.4".to_string())
        );
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        for i in 0..10 {
            store.set("last_ip.txt", &format!("1.2.3.{}", i)).await.unwrap();
        }

        assert_eq!(
            store.get("last_ip.txt").await.unwrap(),
            Some("1.2.3.9".to_string())
        );
        assert!(!store.temp_path("last_ip.txt").exists());
    }

    #[tokio::test]
    async fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("state").join("dnsync");

        let store = FileStateStore::new(&nested).await.unwrap();
        store.set("cert_arn_a_b_com.txt", "arn:aws:acm:1").await.unwrap();

        assert!(nested.join("cert_arn_a_b_com.txt").exists());
    }

    #[tokio::test]
    async fn test_path_like_keys_rejected() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        assert!(matches!(
            store.set("../escape", "x").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(store.get("").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_sync_after_write() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        store.set("last_ip.txt", "1.2.3.4").await.unwrap();
        store.sync_dir().await.unwrap();

        // A vanished directory surfaces as a store error, not a silent success
        let gone = FileStateStore {
            dir: dir.path().join("removed"),
        };
        assert!(matches!(gone.sync_dir().await, Err(Error::StateStore(_))));
        assert!(matches!(
            gone.set("last_ip.txt", "1.2.3.4").await,
            Err(Error::StateStore(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_value_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();

        // A directory where a value file should be cannot be read as a string
        fs::create_dir(dir.path().join("last_ip.txt")).await.unwrap();

        assert!(matches!(
            store.get("last_ip.txt").await,
            Err(Error::StateStore(_))
        ));
    }
}
