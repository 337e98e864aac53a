//! Upload storage for files shared in the room.
//!
//! Blobs are written under the configured upload directory using a generated
//! [`StorageKey`] as the file name. The client filename is kept only as
//! display metadata and never touches the filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use huddle_config::UploadConfig;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::entities::{FileHandle, StorageKey};
use crate::types::{ChatError, ChatResult};
use crate::utils::display_filename;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Default)]
struct RelayIndex {
    files: HashMap<StorageKey, FileHandle>,
    /// Slots claimed by uploads still being written
    reserved: usize,
}

/// A claimed upload slot.
///
/// Dropping it without [`commit`](Self::commit), e.g. when the upload future
/// is abandoned mid-write, releases the slot and removes the partial blob.
struct Reservation<'a> {
    relay: &'a FileRelay,
    path: PathBuf,
    settled: bool,
}

impl Reservation<'_> {
    fn commit(mut self, handle: FileHandle) {
        let mut index = self.relay.index();
        index.reserved -= 1;
        index.files.insert(handle.storage_key, handle);
        self.settled = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.relay.index().reserved -= 1;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed unfinished upload"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), "failed to remove unfinished upload: {err}"),
        }
    }
}

#[derive(Debug)]
pub struct FileRelay {
    dir: PathBuf,
    max_bytes: u64,
    max_files: usize,
    index: Mutex<RelayIndex>,
}

impl FileRelay {
    /// Prepare the upload directory.
    pub async fn open(config: &UploadConfig) -> ChatResult<Self> {
        let dir = PathBuf::from(&config.dir);
        tokio::fs::create_dir_all(&dir).await.map_err(|err| {
            ChatError::file_upload(format!(
                "unable to create upload directory {}: {err}",
                dir.display()
            ))
        })?;
        info!(dir = %dir.display(), max_bytes = config.max_bytes, "upload storage ready");

        Ok(Self {
            dir,
            max_bytes: config.max_bytes,
            max_files: config.max_files,
            index: Mutex::new(RelayIndex::default()),
        })
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist an upload and return its handle.
    pub async fn store(
        &self,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> ChatResult<FileHandle> {
        let size = data.len() as u64;
        if size > self.max_bytes {
            return Err(ChatError::FileTooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let storage_key = StorageKey::generate();
        let reservation = self.reserve(storage_key)?;

        let handle = FileHandle {
            storage_key,
            original_filename: display_filename(filename),
            size_bytes: size,
            content_type: content_type
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
        };

        self.write_blob(&reservation.path, data).await?;
        reservation.commit(handle.clone());
        debug!(key = %handle.storage_key, size, filename = %handle.original_filename, "stored upload");

        Ok(handle)
    }

    fn index(&self) -> MutexGuard<'_, RelayIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, key: StorageKey) -> ChatResult<Reservation<'_>> {
        let mut index = self.index();
        if index.files.len() + index.reserved >= self.max_files {
            return Err(ChatError::StorageFull {
                limit: self.max_files,
            });
        }
        index.reserved += 1;

        Ok(Reservation {
            relay: self,
            path: self.blob_path(&key),
            settled: false,
        })
    }

    pub async fn lookup(&self, key: &StorageKey) -> Option<FileHandle> {
        self.index().files.get(key).cloned()
    }

    /// Resolve a key received from a client.
    pub async fn resolve(&self, raw_key: &str) -> ChatResult<FileHandle> {
        let key = StorageKey::parse(raw_key).ok_or_else(|| ChatError::file_not_found(raw_key))?;
        self.lookup(&key)
            .await
            .ok_or_else(|| ChatError::file_not_found(raw_key))
    }

    /// Read a stored blob back along with its metadata.
    pub async fn retrieve(&self, key: &StorageKey) -> ChatResult<(FileHandle, Bytes)> {
        let handle = self
            .lookup(key)
            .await
            .ok_or_else(|| ChatError::file_not_found(key.to_string()))?;

        match tokio::fs::read(self.blob_path(key)).await {
            Ok(data) => Ok((handle, Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(%key, "stored upload vanished from disk");
                self.index().files.remove(key);
                Err(ChatError::file_not_found(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn len(&self) -> usize {
        self.index().files.len()
    }

    fn blob_path(&self, key: &StorageKey) -> PathBuf {
        self.dir.join(key.to_string())
    }

    async fn write_blob(&self, path: &Path, data: &[u8]) -> ChatResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn relay(dir: &TempDir, max_bytes: u64, max_files: usize) -> FileRelay {
        FileRelay::open(&UploadConfig {
            dir: dir.path().join("uploads").to_string_lossy().into_owned(),
            max_bytes,
            max_files,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn store_then_retrieve_returns_identical_bytes() {
        let dir = TempDir::new().unwrap();
        let relay = relay(&dir, 1024, 10).await;

        let handle = relay
            .store("notes.txt", Some("text/plain"), b"hello world")
            .await
            .unwrap();
        assert_eq!(handle.size_bytes, 11);
        assert_eq!(handle.original_filename, "notes.txt");

        let (meta, data) = relay.retrieve(&handle.storage_key).await.unwrap();
        assert_eq!(meta, handle);
        assert_eq!(&data[..], b"hello world");
    }

    #[tokio::test]
    async fn blobs_are_named_by_key_not_by_filename() {
        let dir = TempDir::new().unwrap();
        let relay = relay(&dir, 1024, 10).await;

        let handle = relay
            .store("../../etc/passwd", None, b"x")
            .await
            .unwrap();
        assert_eq!(handle.original_filename, "passwd");
        assert_eq!(handle.content_type, DEFAULT_CONTENT_TYPE);
        assert!(relay.dir().join(handle.storage_key.to_string()).exists());
        assert!(!dir.path().join("etc").exists());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let relay = relay(&dir, 4, 10).await;

        let error = relay.store("big.bin", None, b"12345").await.unwrap_err();
        assert!(matches!(error, ChatError::FileTooLarge { size: 5, limit: 4 }));
        assert_eq!(relay.len().await, 0);
    }

    #[tokio::test]
    async fn file_count_limit_is_enforced() {
        let dir = TempDir::new().unwrap();
        let relay = relay(&dir, 1024, 2).await;

        relay.store("a", None, b"a").await.unwrap();
        relay.store("b", None, b"b").await.unwrap();
        let error = relay.store("c", None, b"c").await.unwrap_err();
        assert!(matches!(error, ChatError::StorageFull { limit: 2 }));
    }

    #[tokio::test]
    async fn abandoned_upload_releases_its_slot() {
        let dir = TempDir::new().unwrap();
        let relay = relay(&dir, 16 << 20, 2).await;

        let large = vec![7u8; 8 << 20];
        let abandoned =
            tokio::time::timeout(std::time::Duration::ZERO, relay.store("a", None, &large)).await;
        assert!(abandoned.is_err(), "upload should still be in flight");
        assert_eq!(relay.len().await, 0);

        relay.store("b", None, b"b").await.unwrap();
        relay.store("c", None, b"c").await.unwrap();
        assert_eq!(relay.len().await, 2);

        let error = relay.store("d", None, b"d").await.unwrap_err();
        assert!(matches!(error, ChatError::StorageFull { limit: 2 }));
    }

    #[tokio::test]
    async fn failed_write_releases_its_slot() {
        let dir = TempDir::new().unwrap();
        let relay = relay(&dir, 1024, 1).await;
        std::fs::remove_dir_all(relay.dir()).unwrap();

        assert!(relay.store("a", None, b"a").await.is_err());

        std::fs::create_dir_all(relay.dir()).unwrap();
        relay.store("b", None, b"b").await.unwrap();
        assert_eq!(relay.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_keys_are_not_found() {
        let dir = TempDir::new().unwrap();
        let relay = relay(&dir, 1024, 10).await;

        assert!(matches!(
            relay.retrieve(&StorageKey::generate()).await,
            Err(ChatError::FileNotFound { .. })
        ));
        assert!(matches!(
            relay.resolve("not-a-key").await,
            Err(ChatError::FileNotFound { .. })
        ));
    }
}
