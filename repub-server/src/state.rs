//! # Application State Management
//!
//! Shared state handed to every request handler. [`AppState`] is built once at
//! start-up, wrapped in an `Arc`, and owns the services of the publish and
//! read paths together with the effective configuration.
//!
//! ```rust
//! use std::sync::Arc;
//! use repub_server::config::Config;
//! use repub_server::state::AppState;
//! use repub_server::storage::MemoryBlobStore;
//! use repub_server::store::MemoryPackageStore;
//!
//! let state = AppState::new(
//!     Config::default(),
//!     Arc::new(MemoryPackageStore::new()),
//!     Arc::new(MemoryBlobStore::new()),
//! )?;
//! assert_eq!(state.publish.upload_target().fields.len(), 0);
//! # Ok::<(), repub_server::error::AppError>(())
//! ```

use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppResult;
use crate::publish::PublishService;
use crate::query::QueryService;
use crate::staging::{MemoryUploadStaging, UploadStaging};
use crate::storage::BlobStore;
use crate::store::PackageStore;
use crate::urls::PublicUrls;

/// Application state containing shared configuration and services.
///
/// # Fields
///
/// * `config` - Effective configuration, including the accepted tokens
/// * `publish` - Three-phase publish workflow
/// * `query` - Read path for metadata and downloads
/// * `staging` - Pending uploads, exposed for status reporting
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub publish: PublishService,
    pub query: QueryService,
    pub staging: Arc<dyn UploadStaging>,
}

impl AppState {
    /// Wire the services around the given store and blob store, staging
    /// uploads in memory with the configured TTL.
    pub fn new(
        config: Config,
        store: Arc<dyn PackageStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> AppResult<Self> {
        let staging: Arc<dyn UploadStaging> =
            Arc::new(MemoryUploadStaging::new(config.pending_upload_ttl()));
        Self::with_staging(config, store, blobs, staging)
    }

    pub fn with_staging(
        config: Config,
        store: Arc<dyn PackageStore>,
        blobs: Arc<dyn BlobStore>,
        staging: Arc<dyn UploadStaging>,
    ) -> AppResult<Self> {
        let urls = PublicUrls::new(&config.server.base_url)?;

        Ok(AppState {
            publish: PublishService::new(
                Arc::clone(&store),
                Arc::clone(&blobs),
                Arc::clone(&staging),
                urls.clone(),
            ),
            query: QueryService::new(store, blobs, urls),
            staging,
            config: Arc::new(config),
        })
    }
}

/// Standardized success response, serialized as `{"success": {"message": "..."}}`.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: SuccessMessage,
}

#[derive(Debug, Serialize)]
pub struct SuccessMessage {
    /// Human-readable success message describing the completed operation
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        SuccessResponse {
            success: SuccessMessage {
                message: message.into(),
            },
        }
    }
}
