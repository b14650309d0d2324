//! # Publish Workflow
//!
//! The three-phase publish handshake:
//!
//! 1. [`PublishService::upload_target`]: tell the client where to post the archive
//! 2. [`PublishService::stage_upload`]: hold the archive under a finalize token
//! 3. [`PublishService::finalize`]: validate and commit the staged archive
//!
//! Finalization runs its checks in a fixed order. Authorization and the
//! duplicate-version check happen before anything durable is written, so the
//! only compensation ever needed is deleting the archive blob when the
//! version record cannot be created.
//!
//! Two finalizes of the same version can both pass the duplicate check. The
//! blob store never replaces an existing archive, so the later one fails at
//! the blob write, and a version record that already exists is never left
//! without its archive.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::archive::{self, ExtractedArchive};
use crate::error::{AppError, AppResult};
use crate::models::{NewPackageVersion, Package, PublishedVersion, UploadTarget};
use crate::pubspec::{self, Pubspec};
use crate::staging::{FinalizeToken, PendingUpload, UploadStaging};
use crate::storage::{BlobError, BlobStore};
use crate::store::{PackageStore, StoreError};
use crate::urls::PublicUrls;

/// Orchestrates staging, validation and the store/blob writes of a publish.
#[derive(Clone)]
pub struct PublishService {
    store: Arc<dyn PackageStore>,
    blobs: Arc<dyn BlobStore>,
    staging: Arc<dyn UploadStaging>,
    urls: PublicUrls,
}

impl PublishService {
    pub fn new(
        store: Arc<dyn PackageStore>,
        blobs: Arc<dyn BlobStore>,
        staging: Arc<dyn UploadStaging>,
        urls: PublicUrls,
    ) -> Self {
        Self {
            store,
            blobs,
            staging,
            urls,
        }
    }

    /// Phase 1. Pure function of the base URL.
    pub fn upload_target(&self) -> UploadTarget {
        UploadTarget {
            url: self.urls.upload_url(),
            fields: serde_json::Map::new(),
        }
    }

    /// Phase 2. Stage an archive and return its finalize token.
    pub fn stage_upload(&self, archive: Vec<u8>, uploader: &str) -> FinalizeToken {
        let size = archive.len();
        let token = self.staging.stage(PendingUpload {
            archive,
            uploader: uploader.to_string(),
        });
        info!(uploader, size, pending = self.staging.len(), "Staged package upload");
        token
    }

    /// URL the client calls to finalize the upload staged under `token`.
    pub fn finalize_url(&self, token: &str) -> String {
        self.urls.finalize_url(token)
    }

    /// Phase 3. Consume the staged upload and publish it.
    ///
    /// The token is consumed whether or not publishing succeeds.
    pub async fn finalize(&self, token: &str) -> AppResult<PublishedVersion> {
        let upload = self.staging.take(token).ok_or(AppError::UploadNotFound)?;
        self.publish(upload).await
    }

    /// Validate and commit an archive on behalf of `upload.uploader`.
    pub async fn publish(&self, upload: PendingUpload) -> AppResult<PublishedVersion> {
        let PendingUpload { archive, uploader } = upload;

        let ExtractedArchive {
            manifest,
            readme,
            changelog,
        } = archive::extract(&archive)?;
        let pubspec = pubspec::parse(&manifest)?;
        let Pubspec { name, version, .. } = &pubspec;
        debug!(package = %name, version = %version, "Validated pubspec");

        let package = self.get_or_create_package(name).await?;
        self.authorize_uploader(&package, &uploader).await?;

        let existing = self.store.get_versions(package.id).await?;
        if existing.iter().any(|v| v.version == *version) {
            return Err(AppError::VersionAlreadyExists {
                package: name.clone(),
                version: version.clone(),
            });
        }

        let archive_key = match self.blobs.store(name, version, &archive).await {
            Ok(key) => key,
            Err(BlobError::AlreadyExists(key)) => {
                warn!(
                    package = %name,
                    version = %version,
                    key = %key,
                    "Archive already stored for version"
                );
                return Err(AppError::VersionAlreadyExists {
                    package: name.clone(),
                    version: version.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let archive_sha256 = archive::sha256_hash(&archive);

        let new_version = NewPackageVersion {
            package_id: package.id,
            version: version.clone(),
            description: pubspec.description.clone(),
            pubspec_yaml: manifest,
            readme,
            changelog,
            archive_key: archive_key.clone(),
            archive_sha256: Some(archive_sha256),
            uploader: Some(uploader.clone()),
        };

        let created = match self.store.create_version(new_version).await {
            Ok(created) => created,
            // The committed version may own this key
            Err(err @ StoreError::DuplicateVersion { .. }) => return Err(err.into()),
            Err(err) => {
                self.discard_blob(&archive_key).await;
                return Err(err.into());
            }
        };

        info!(
            package = %name,
            version = %created.version,
            uploader = %uploader,
            size = archive.len(),
            "Package published successfully"
        );

        Ok(PublishedVersion {
            package: name.clone(),
            version: created.version.clone(),
            url: self.urls.version_url(name, &created.version),
        })
    }

    async fn get_or_create_package(&self, name: &str) -> AppResult<Package> {
        if let Some(package) = self.store.get_package(name).await? {
            return Ok(package);
        }

        match self.store.create_package(name, false).await {
            Ok(package) => {
                info!(package = %name, "Created package");
                Ok(package)
            }
            // Another finalize created it first
            Err(StoreError::DuplicatePackage(_)) => self
                .store
                .get_package(name)
                .await?
                .ok_or_else(|| AppError::InternalError(format!("package {name} vanished"))),
            Err(err) => Err(err.into()),
        }
    }

    /// The first uploader of a package is authorized implicitly; later
    /// uploaders must already be in the set.
    async fn authorize_uploader(&self, package: &Package, uploader: &str) -> AppResult<()> {
        let uploaders = self.store.get_uploaders(package.id).await?;

        if uploaders.is_empty() {
            self.store.add_uploader(package.id, uploader).await?;
            info!(package = %package.name, uploader, "Registered first uploader");
            return Ok(());
        }

        if !uploaders.iter().any(|u| u == uploader) {
            warn!(package = %package.name, uploader, "Uploader is not authorized for package");
            return Err(AppError::UnauthorizedUploader {
                package: package.name.clone(),
                uploader: uploader.to_string(),
            });
        }

        Ok(())
    }

    async fn discard_blob(&self, key: &str) {
        match self.blobs.delete(key).await {
            Ok(()) => warn!(key, "Removed archive after failed version record write"),
            Err(e) => error!(key, error = %e, "Failed to remove orphaned archive"),
        }
    }
}
