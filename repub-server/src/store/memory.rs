use async_trait::async_trait;
use chrono::Utc;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::catalog::Catalog;
use super::{PackageStore, StoreError, StoreResult};
use crate::models::{NewPackageVersion, Package, PackageId, PackageVersion};

/// Process-local package store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryPackageStore {
    catalog: RwLock<Catalog>,
}

impl MemoryPackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Catalog>> {
        self.catalog
            .read()
            .map_err(|_| StoreError::Backend("catalog lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Catalog>> {
        self.catalog
            .write()
            .map_err(|_| StoreError::Backend("catalog lock poisoned".to_string()))
    }
}

#[async_trait]
impl PackageStore for MemoryPackageStore {
    async fn get_package(&self, name: &str) -> StoreResult<Option<Package>> {
        Ok(self.read()?.package_by_name(name).cloned())
    }

    async fn create_package(&self, name: &str, private: bool) -> StoreResult<Package> {
        self.write()?.create_package(name, private, Utc::now())
    }

    async fn list_packages(&self, limit: usize, offset: usize) -> StoreResult<Vec<Package>> {
        Ok(self.read()?.list_packages(limit, offset))
    }

    async fn count_packages(&self) -> StoreResult<usize> {
        Ok(self.read()?.package_count())
    }

    async fn get_versions(&self, package_id: PackageId) -> StoreResult<Vec<PackageVersion>> {
        Ok(self.read()?.versions_of(package_id))
    }

    async fn create_version(&self, version: NewPackageVersion) -> StoreResult<PackageVersion> {
        self.write()?.create_version(version, Utc::now())
    }

    async fn get_uploaders(&self, package_id: PackageId) -> StoreResult<Vec<String>> {
        Ok(self.read()?.uploaders(package_id))
    }

    async fn add_uploader(&self, package_id: PackageId, uploader: &str) -> StoreResult<()> {
        self.write()?.add_uploader(package_id, uploader)
    }

    async fn record_download(&self, package_id: PackageId, version: &str) -> StoreResult<()> {
        self.write()?.record_download(package_id, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_version(package_id: PackageId, version: &str) -> NewPackageVersion {
        NewPackageVersion {
            package_id,
            version: version.to_string(),
            description: Some("test".to_string()),
            pubspec_yaml: format!("name: racer\nversion: {version}\n"),
            readme: None,
            changelog: None,
            archive_key: format!("racer/{version}/racer-{version}.tar.gz"),
            archive_sha256: None,
            uploader: Some("alice".to_string()),
        }
    }

    #[tokio::test]
    async fn test_get_package_roundtrip() {
        let store = MemoryPackageStore::new();
        assert!(store.get_package("pkgA").await.unwrap().is_none());

        let created = store.create_package("pkgA", false).await.unwrap();
        let fetched = store.get_package("pkgA").await.unwrap().unwrap();
        assert_eq!(created, fetched);
        assert_eq!(store.count_packages().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_one_version() {
        let store = Arc::new(MemoryPackageStore::new());
        let pkg = store.create_package("racer", false).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create_version(new_version(pkg.id, "1.0.0")).await
            }));
        }

        let mut created = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(StoreError::DuplicateVersion { .. }) => duplicates += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(duplicates, 15);
        assert_eq!(store.get_versions(pkg.id).await.unwrap().len(), 1);
    }
}
