//! # Hosted Pub Package Repository
//!
//! A server for Dart/Flutter packages speaking the hosted pub repository
//! protocol. Clients publish through a three-phase workflow (request an upload
//! URL, upload the archive, finalize) and read package metadata and archives
//! back through the same API.
//!
//! ## Key Modules
//!
//! - [`publish`]: the publish workflow and its ordering of side effects
//! - [`query`]: package metadata, listings and downloads
//! - [`archive`] and [`pubspec`]: archive extraction and manifest parsing
//! - [`store`]: package and version metadata persistence
//! - [`storage`]: archive blob storage
//! - [`staging`]: uploads waiting for finalization
//! - [`server`] and [`api`]: HTTP routing and handlers
//! - [`config`] and [`auth`]: configuration and bearer token checks
//! - [`error`]: error taxonomy and the pub error response format

pub mod api;
pub mod archive;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod publish;
pub mod pubspec;
pub mod query;
pub mod server;
pub mod staging;
pub mod state;
pub mod storage;
pub mod store;
pub mod urls;
pub mod validation;

pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use server::{build_router, run_server};
pub use state::AppState;
