//! # Package and Version Store
//!
//! The durable record of packages, their published versions and the uploaders
//! allowed to publish them. The publish workflow and the read path only see
//! the [`PackageStore`] trait.
//!
//! ## Implementations
//!
//! - [`MemoryPackageStore`]: process-local maps, used by tests and embedders
//! - [`FilePackageStore`]: the same catalog persisted as one JSON document
//!
//! Both enforce uniqueness of `(package, version)` inside `create_version`,
//! so two racing finalize calls cannot both create the same version; the
//! loser gets [`StoreError::DuplicateVersion`].

use async_trait::async_trait;

use crate::models::{NewPackageVersion, Package, PackageId, PackageVersion};

mod catalog;
mod file;
mod memory;

pub use file::FilePackageStore;
pub use memory::MemoryPackageStore;

/// Errors raised by a [`PackageStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unique constraint on `(package, version)` violated
    #[error("Version {version} of package {package} already exists")]
    DuplicateVersion { package: String, version: String },

    #[error("Package {0} already exists")]
    DuplicatePackage(String),

    #[error("Package with id {0} does not exist")]
    UnknownPackage(PackageId),

    #[error("Version {version} not found for package id {package_id}")]
    UnknownVersion {
        package_id: PackageId,
        version: String,
    },

    #[error("Store backend failure: {0}")]
    Backend(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store document is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence interface consumed by the publish workflow and the read path.
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Look up a package by its exact name.
    async fn get_package(&self, name: &str) -> StoreResult<Option<Package>>;

    /// Create a package with default metadata.
    async fn create_package(&self, name: &str, private: bool) -> StoreResult<Package>;

    /// Page through packages, most recently updated first.
    async fn list_packages(&self, limit: usize, offset: usize) -> StoreResult<Vec<Package>>;

    async fn count_packages(&self) -> StoreResult<usize>;

    /// All versions of a package, newest first.
    async fn get_versions(&self, package_id: PackageId) -> StoreResult<Vec<PackageVersion>>;

    /// Insert a version record.
    ///
    /// Fails with [`StoreError::DuplicateVersion`] when the package already has
    /// a version with exactly the same string.
    async fn create_version(&self, version: NewPackageVersion) -> StoreResult<PackageVersion>;

    async fn get_uploaders(&self, package_id: PackageId) -> StoreResult<Vec<String>>;

    async fn add_uploader(&self, package_id: PackageId, uploader: &str) -> StoreResult<()>;

    /// Bump the download counters of a version and its package.
    async fn record_download(&self, package_id: PackageId, version: &str) -> StoreResult<()>;
}
