//! # Archive Blob Storage
//!
//! Durable storage of package archives addressed by a relative key. The key
//! for a version is `{name}/{version}/{name}-{version}.tar.gz`, see
//! [`archive_key`].
//!
//! - [`LocalBlobStore`]: files under a base directory
//! - [`MemoryBlobStore`]: a map of keys to bytes, for tests and embedding

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::validation::validate_safe_path;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Stream of archive chunks.
pub type BlobStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Blob already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid blob key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Blob I/O failure: {0}")]
    Io(String),
}

impl From<io::Error> for BlobError {
    fn from(err: io::Error) -> Self {
        BlobError::Io(err.to_string())
    }
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Storage key for the archive of `name` at `version`.
pub fn archive_key(name: &str, version: &str) -> String {
    format!("{name}/{version}/{name}-{version}.tar.gz")
}

/// Archive storage consumed by the publish workflow and downloads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the archive of a package version and return its key.
    ///
    /// Never replaces an existing blob: a key that is already taken yields
    /// [`BlobError::AlreadyExists`] and leaves the stored bytes untouched.
    async fn store(&self, package: &str, version: &str, data: &[u8]) -> BlobResult<String>;

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>>;

    /// Stream a blob in chunks instead of loading it whole.
    async fn get_reader(&self, key: &str) -> BlobResult<BlobStream>;

    async fn exists(&self, key: &str) -> BlobResult<bool>;

    async fn delete(&self, key: &str) -> BlobResult<()>;
}

fn checked_key(key: &str) -> BlobResult<PathBuf> {
    validate_safe_path(key).map_err(|e| BlobError::InvalidKey {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn not_found_or_io(err: io::Error, key: &str) -> BlobError {
    if err.kind() == io::ErrorKind::NotFound {
        BlobError::NotFound(key.to_string())
    } else {
        BlobError::from(err)
    }
}

/// Filesystem blob store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, key: &str) -> BlobResult<PathBuf> {
        Ok(self.base_path.join(checked_key(key)?))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, package: &str, version: &str, data: &[u8]) -> BlobResult<String> {
        let key = archive_key(package, version);
        let path = self.resolve(&key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
            debug!(parent = %parent.display(), "Created archive directory");
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => BlobError::AlreadyExists(key.clone()),
                _ => BlobError::from(e),
            })?;

        let written = match file.write_all(data).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // The file is ours, a partial archive must not linger under the key
            let _ = fs::remove_file(&path).await;
            return Err(e.into());
        }

        info!(
            path = %path.display(),
            size = data.len(),
            "Archive saved successfully"
        );
        Ok(key)
    }

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).await.map_err(|e| not_found_or_io(e, key))
    }

    async fn get_reader(&self, key: &str) -> BlobResult<BlobStream> {
        let path = self.resolve(key)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(e, key))?;

        let chunks = stream::try_unfold(file, |mut file| async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            let read = file.read(&mut buf).await?;
            let chunk = (read > 0).then(|| {
                buf.truncate(read);
                (Bytes::from(buf), file)
            });
            Ok::<_, io::Error>(chunk)
        });

        Ok(chunks.boxed())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let path = self.resolve(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.resolve(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(e, key))?;
        info!(path = %path.display(), "Archive removed");
        Ok(())
    }
}

/// Blob store keeping archives in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, key: &str) -> BlobResult<Bytes> {
        self.blobs
            .read()
            .map_err(|_| BlobError::Io("blob map lock poisoned".to_string()))?
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, package: &str, version: &str, data: &[u8]) -> BlobResult<String> {
        let key = archive_key(package, version);
        checked_key(&key)?;
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| BlobError::Io("blob map lock poisoned".to_string()))?;
        if blobs.contains_key(&key) {
            return Err(BlobError::AlreadyExists(key));
        }
        blobs.insert(key.clone(), Bytes::copy_from_slice(data));
        Ok(key)
    }

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        Ok(self.lookup(key)?.to_vec())
    }

    async fn get_reader(&self, key: &str) -> BlobResult<BlobStream> {
        let data = self.lookup(key)?;
        Ok(stream::once(async move { Ok(data) }).boxed())
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| BlobError::Io("blob map lock poisoned".to_string()))?
            .contains_key(key))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.blobs
            .write()
            .map_err(|_| BlobError::Io("blob map lock poisoned".to_string()))?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}
