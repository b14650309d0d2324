//! In-memory catalog shared by the store implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{StoreError, StoreResult};
use crate::models::{NewPackageVersion, Package, PackageId, PackageVersion, VersionId};

/// Complete state of a package store.
///
/// Every mutation is a plain method on this struct; the store types only add
/// locking and, for the file store, persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Catalog {
    next_package_id: PackageId,
    next_version_id: VersionId,
    packages: BTreeMap<PackageId, Package>,
    versions: Vec<PackageVersion>,
    uploaders: BTreeMap<PackageId, BTreeSet<String>>,
}

impl Catalog {
    pub(crate) fn package_by_name(&self, name: &str) -> Option<&Package> {
        self.packages.values().find(|p| p.name == name)
    }

    fn package_mut(&mut self, package_id: PackageId) -> StoreResult<&mut Package> {
        self.packages
            .get_mut(&package_id)
            .ok_or(StoreError::UnknownPackage(package_id))
    }

    pub(crate) fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub(crate) fn create_package(
        &mut self,
        name: &str,
        private: bool,
        now: DateTime<Utc>,
    ) -> StoreResult<Package> {
        if self.package_by_name(name).is_some() {
            return Err(StoreError::DuplicatePackage(name.to_string()));
        }

        self.next_package_id += 1;
        let package = Package {
            id: self.next_package_id,
            name: name.to_string(),
            private,
            description: None,
            homepage: None,
            repository: None,
            documentation: None,
            topics: Vec::new(),
            download_count: 0,
            like_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.packages.insert(package.id, package.clone());
        Ok(package)
    }

    pub(crate) fn list_packages(&self, limit: usize, offset: usize) -> Vec<Package> {
        let mut packages: Vec<&Package> = self.packages.values().collect();
        packages.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        packages
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub(crate) fn versions_of(&self, package_id: PackageId) -> Vec<PackageVersion> {
        let mut versions: Vec<PackageVersion> = self
            .versions
            .iter()
            .filter(|v| v.package_id == package_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        versions
    }

    pub(crate) fn create_version(
        &mut self,
        new: NewPackageVersion,
        now: DateTime<Utc>,
    ) -> StoreResult<PackageVersion> {
        let package_name = self.package_mut(new.package_id)?.name.clone();

        if self
            .versions
            .iter()
            .any(|v| v.package_id == new.package_id && v.version == new.version)
        {
            return Err(StoreError::DuplicateVersion {
                package: package_name,
                version: new.version,
            });
        }

        self.next_version_id += 1;
        let version = PackageVersion {
            id: self.next_version_id,
            package_id: new.package_id,
            version: new.version,
            description: new.description,
            pubspec_yaml: new.pubspec_yaml,
            readme: new.readme,
            changelog: new.changelog,
            archive_key: new.archive_key,
            archive_sha256: new.archive_sha256,
            uploader: new.uploader,
            retracted: false,
            download_count: 0,
            created_at: now,
        };
        self.versions.push(version.clone());
        self.package_mut(version.package_id)?.updated_at = now;
        Ok(version)
    }

    pub(crate) fn uploaders(&self, package_id: PackageId) -> Vec<String> {
        self.uploaders
            .get(&package_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn add_uploader(&mut self, package_id: PackageId, uploader: &str) -> StoreResult<()> {
        self.package_mut(package_id)?;
        self.uploaders
            .entry(package_id)
            .or_default()
            .insert(uploader.to_string());
        Ok(())
    }

    pub(crate) fn record_download(&mut self, package_id: PackageId, version: &str) -> StoreResult<()> {
        let record = self
            .versions
            .iter_mut()
            .find(|v| v.package_id == package_id && v.version == version)
            .ok_or_else(|| StoreError::UnknownVersion {
                package_id,
                version: version.to_string(),
            })?;
        record.download_count += 1;
        self.package_mut(package_id)?.download_count += 1;
        Ok(())
    }
}
