//! Read path: package metadata, single versions, listings and archive downloads.

use std::sync::Arc;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::{
    Package, PackageListResponse, PackageResponse, PackageSummary, PackageVersion, VersionResponse,
};
use crate::pubspec;
use crate::storage::{BlobStore, BlobStream};
use crate::store::PackageStore;
use crate::urls::PublicUrls;

/// Upper bound of the `size` listing parameter.
pub const MAX_PAGE_SIZE: usize = 100;

/// An archive ready to be streamed to the client.
pub struct ArchiveDownload {
    pub file_name: String,
    pub body: BlobStream,
}

/// Pick the version reported as `latest`.
///
/// `versions` must be ordered newest first. The newest version wins even when
/// it is retracted; hiding retracted versions is left to clients.
pub fn select_latest(versions: &[PackageVersion]) -> Option<&PackageVersion> {
    versions.first()
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn PackageStore>,
    blobs: Arc<dyn BlobStore>,
    urls: PublicUrls,
}

impl QueryService {
    pub fn new(store: Arc<dyn PackageStore>, blobs: Arc<dyn BlobStore>, urls: PublicUrls) -> Self {
        Self { store, blobs, urls }
    }

    /// Package metadata with every version, newest first.
    ///
    /// Returns `Ok(None)` for unknown packages and [`AppError::NoVersions`]
    /// for a package record without versions.
    pub async fn get_package(&self, name: &str) -> AppResult<Option<PackageResponse>> {
        let Some(package) = self.store.get_package(name).await? else {
            return Ok(None);
        };

        let versions = self.store.get_versions(package.id).await?;
        let latest = select_latest(&versions)
            .ok_or_else(|| AppError::NoVersions(package.name.clone()))?;

        let latest = self.version_response(&package.name, latest)?;
        let versions = versions
            .iter()
            .map(|v| self.version_response(&package.name, v))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(PackageResponse {
            name: package.name,
            is_discontinued: false,
            latest,
            versions,
        }))
    }

    /// A single version by exact version string.
    pub async fn get_version(&self, name: &str, version: &str) -> AppResult<Option<VersionResponse>> {
        let Some((package, record)) = self.find_version(name, version).await? else {
            return Ok(None);
        };
        Ok(Some(self.version_response(&package.name, &record)?))
    }

    /// Open the archive of a version for streaming and count the download.
    pub async fn download(&self, name: &str, version: &str) -> AppResult<ArchiveDownload> {
        let (package, record) = self
            .find_version(name, version)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Package {name} version {version} not found")))?;

        let body = self.blobs.get_reader(&record.archive_key).await?;

        if let Err(e) = self.store.record_download(package.id, &record.version).await {
            warn!(package = %name, version = %version, error = %e, "Failed to record download");
        }

        Ok(ArchiveDownload {
            file_name: format!("{}-{}.tar.gz", package.name, record.version),
            body,
        })
    }

    /// One page of packages, most recently updated first. `page` starts at 1.
    pub async fn list_packages(&self, page: usize, size: usize) -> AppResult<PackageListResponse> {
        if page == 0 {
            return Err(AppError::MalformedRequest(
                "page must be at least 1".to_string(),
            ));
        }
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(AppError::MalformedRequest(format!(
                "size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let offset = (page - 1).saturating_mul(size);
        let packages = self.store.list_packages(size, offset).await?;

        let mut summaries = Vec::with_capacity(packages.len());
        for package in packages {
            let versions = self.store.get_versions(package.id).await?;
            summaries.push(PackageSummary {
                latest: select_latest(&versions).map(|v| v.version.clone()),
                name: package.name,
                private: package.private,
                download_count: package.download_count,
                updated: package.updated_at,
            });
        }

        Ok(PackageListResponse {
            packages: summaries,
        })
    }

    pub async fn package_count(&self) -> AppResult<usize> {
        Ok(self.store.count_packages().await?)
    }

    async fn find_version(
        &self,
        name: &str,
        version: &str,
    ) -> AppResult<Option<(Package, PackageVersion)>> {
        let Some(package) = self.store.get_package(name).await? else {
            return Ok(None);
        };
        let record = self
            .store
            .get_versions(package.id)
            .await?
            .into_iter()
            .find(|v| v.version == version);
        Ok(record.map(|record| (package, record)))
    }

    fn version_response(&self, name: &str, version: &PackageVersion) -> AppResult<VersionResponse> {
        let pubspec = pubspec::parse(&version.pubspec_yaml)
            .and_then(|spec| spec.to_json())
            .map_err(|e| {
                AppError::InternalError(format!(
                    "stored pubspec of {name} {} is unreadable: {e}",
                    version.version
                ))
            })?;

        Ok(VersionResponse {
            version: version.version.clone(),
            retracted: version.retracted,
            archive_url: self.urls.archive_url(name, &version.version),
            archive_sha256: version.archive_sha256.clone().filter(|h| !h.is_empty()),
            pubspec,
        })
    }
}
