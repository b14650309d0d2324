use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::catalog::Catalog;
use super::{PackageStore, StoreResult};
use crate::models::{NewPackageVersion, Package, PackageId, PackageVersion};

/// Downloads counted in memory before the catalog is written out for them.
pub const DOWNLOAD_FLUSH_THRESHOLD: usize = 64;

/// Package store persisted as a single JSON document.
///
/// Mutations are applied to a copy of the catalog, written to a temporary
/// file next to the document and renamed over it; the in-memory catalog only
/// changes once the rename succeeded. Writers are serialized by the lock.
///
/// Download counters are the exception. They are bumped in place and only
/// written with the next mutation, every [`DOWNLOAD_FLUSH_THRESHOLD`]
/// downloads, or on [`FilePackageStore::flush`]. Counts since the last write
/// are lost if the process dies without flushing.
#[derive(Debug)]
pub struct FilePackageStore {
    path: PathBuf,
    catalog: RwLock<Catalog>,
    pending_downloads: AtomicUsize,
}

impl FilePackageStore {
    /// Open the store at `path`, starting empty when the document does not exist yet.
    pub async fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let catalog = if fs::try_exists(&path).await? {
            let raw = fs::read(&path).await?;
            let catalog: Catalog = serde_json::from_slice(&raw)?;
            info!(
                path = %path.display(),
                packages = catalog.package_count(),
                "Loaded package catalog"
            );
            catalog
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            info!(path = %path.display(), "Starting with an empty package catalog");
            Catalog::default()
        };

        Ok(Self {
            path,
            catalog: RwLock::new(catalog),
            pending_downloads: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, catalog: &Catalog) -> StoreResult<()> {
        let content = serde_json::to_vec_pretty(catalog)?;
        let tmp_path = self.path.with_extension("json.tmp");

        fs::write(&tmp_path, &content).await?;
        fs::rename(&tmp_path, &self.path).await?;
        debug!(path = %self.path.display(), size = content.len(), "Persisted package catalog");
        Ok(())
    }

    /// Apply `change` to a copy of the catalog, persist it, then publish it.
    async fn mutate<T, F>(&self, change: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Catalog) -> StoreResult<T> + Send,
        T: Send,
    {
        let mut guard = self.catalog.write().await;
        let mut next = guard.clone();
        let result = change(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        self.pending_downloads.store(0, Ordering::Relaxed);
        Ok(result)
    }

    /// Write out download counts not yet persisted.
    pub async fn flush(&self) -> StoreResult<()> {
        if self.pending_downloads.load(Ordering::Relaxed) == 0 {
            return Ok(());
        }
        let guard = self.catalog.write().await;
        let pending = self.pending_downloads.load(Ordering::Relaxed);
        self.persist(&guard).await?;
        self.pending_downloads.store(0, Ordering::Relaxed);
        debug!(pending, "Flushed download counters");
        Ok(())
    }
}

#[async_trait]
impl PackageStore for FilePackageStore {
    async fn get_package(&self, name: &str) -> StoreResult<Option<Package>> {
        Ok(self.catalog.read().await.package_by_name(name).cloned())
    }

    async fn create_package(&self, name: &str, private: bool) -> StoreResult<Package> {
        self.mutate(|catalog| catalog.create_package(name, private, Utc::now()))
            .await
    }

    async fn list_packages(&self, limit: usize, offset: usize) -> StoreResult<Vec<Package>> {
        Ok(self.catalog.read().await.list_packages(limit, offset))
    }

    async fn count_packages(&self) -> StoreResult<usize> {
        Ok(self.catalog.read().await.package_count())
    }

    async fn get_versions(&self, package_id: PackageId) -> StoreResult<Vec<PackageVersion>> {
        Ok(self.catalog.read().await.versions_of(package_id))
    }

    async fn create_version(&self, version: NewPackageVersion) -> StoreResult<PackageVersion> {
        self.mutate(|catalog| catalog.create_version(version, Utc::now()))
            .await
    }

    async fn get_uploaders(&self, package_id: PackageId) -> StoreResult<Vec<String>> {
        Ok(self.catalog.read().await.uploaders(package_id))
    }

    async fn add_uploader(&self, package_id: PackageId, uploader: &str) -> StoreResult<()> {
        self.mutate(|catalog| catalog.add_uploader(package_id, uploader))
            .await
    }

    async fn record_download(&self, package_id: PackageId, version: &str) -> StoreResult<()> {
        let mut guard = self.catalog.write().await;
        guard.record_download(package_id, version)?;

        let pending = self.pending_downloads.fetch_add(1, Ordering::Relaxed) + 1;
        if pending >= DOWNLOAD_FLUSH_THRESHOLD {
            self.persist(&guard).await?;
            self.pending_downloads.store(0, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use tempfile::TempDir;

    fn new_version(package_id: PackageId, version: &str) -> NewPackageVersion {
        NewPackageVersion {
            package_id,
            version: version.to_string(),
            description: None,
            pubspec_yaml: format!("name: durable\nversion: {version}\n"),
            readme: Some("# Durable".to_string()),
            changelog: None,
            archive_key: format!("durable/{version}/durable-{version}.tar.gz"),
            archive_sha256: Some("00ff".to_string()),
            uploader: Some("alice".to_string()),
        }
    }

    #[tokio::test]
    async fn test_catalog_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metadata").join("packages.json");

        {
            let store = FilePackageStore::open(&path).await.unwrap();
            let pkg = store.create_package("durable", false).await.unwrap();
            store.add_uploader(pkg.id, "alice").await.unwrap();
            store.create_version(new_version(pkg.id, "1.0.0")).await.unwrap();
            store.record_download(pkg.id, "1.0.0").await.unwrap();
            store.flush().await.unwrap();
        }

        let store = FilePackageStore::open(&path).await.unwrap();
        let pkg = store.get_package("durable").await.unwrap().unwrap();
        assert_eq!(pkg.download_count, 1);
        assert_eq!(store.get_uploaders(pkg.id).await.unwrap(), vec!["alice"]);

        let versions = store.get_versions(pkg.id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].readme.as_deref(), Some("# Durable"));

        // Ids keep increasing after a reload
        let other = store.create_package("other", false).await.unwrap();
        assert!(other.id > pkg.id);
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("packages.json");
        let store = FilePackageStore::open(&path).await.unwrap();

        let pkg = store.create_package("durable", false).await.unwrap();
        store.create_version(new_version(pkg.id, "1.0.0")).await.unwrap();
        let before = fs::read(&path).await.unwrap();

        let err = store
            .create_version(new_version(pkg.id, "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateVersion { .. }));
        assert_eq!(fs::read(&path).await.unwrap(), before);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_downloads_are_written_in_batches() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("packages.json");
        let store = FilePackageStore::open(&path).await.unwrap();

        let pkg = store.create_package("durable", false).await.unwrap();
        store.create_version(new_version(pkg.id, "1.0.0")).await.unwrap();
        let before = fs::read(&path).await.unwrap();

        store.record_download(pkg.id, "1.0.0").await.unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), before);
        assert_eq!(
            store.get_package("durable").await.unwrap().unwrap().download_count,
            1
        );

        store.flush().await.unwrap();
        let reopened = FilePackageStore::open(&path).await.unwrap();
        let pkg = reopened.get_package("durable").await.unwrap().unwrap();
        assert_eq!(pkg.download_count, 1);

        // Reaching the threshold writes without an explicit flush
        for _ in 0..DOWNLOAD_FLUSH_THRESHOLD {
            reopened.record_download(pkg.id, "1.0.0").await.unwrap();
        }
        let again = FilePackageStore::open(&path).await.unwrap();
        let versions = again.get_versions(pkg.id).await.unwrap();
        assert_eq!(versions[0].download_count, 1 + DOWNLOAD_FLUSH_THRESHOLD as u64);
    }

    #[tokio::test]
    async fn test_mutation_carries_pending_downloads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("packages.json");
        let store = FilePackageStore::open(&path).await.unwrap();

        let pkg = store.create_package("durable", false).await.unwrap();
        store.create_version(new_version(pkg.id, "1.0.0")).await.unwrap();
        store.record_download(pkg.id, "1.0.0").await.unwrap();
        store.add_uploader(pkg.id, "alice").await.unwrap();

        let reopened = FilePackageStore::open(&path).await.unwrap();
        let pkg = reopened.get_package("durable").await.unwrap().unwrap();
        assert_eq!(pkg.download_count, 1);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("packages.json");
        fs::write(&path, b"{ not json").await.unwrap();

        assert!(matches!(
            FilePackageStore::open(&path).await,
            Err(StoreError::Serialization(_))
        ));
    }
}
