//! Domain records and wire response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type PackageId = u64;
pub type VersionId = u64;

/// A package record; created on the first successful publish of its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub private: bool,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<String>,
    pub documentation: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub download_count: u64,
    pub like_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable published version of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub id: VersionId,
    pub package_id: PackageId,
    pub version: String,
    pub description: Option<String>,
    /// Verbatim `pubspec.yaml` text
    pub pubspec_yaml: String,
    pub readme: Option<String>,
    pub changelog: Option<String>,
    pub archive_key: String,
    pub archive_sha256: Option<String>,
    pub uploader: Option<String>,
    pub retracted: bool,
    pub download_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Input of `PackageStore::create_version`; the store assigns id, counters and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPackageVersion {
    pub package_id: PackageId,
    pub version: String,
    pub description: Option<String>,
    pub pubspec_yaml: String,
    pub readme: Option<String>,
    pub changelog: Option<String>,
    pub archive_key: String,
    pub archive_sha256: Option<String>,
    pub uploader: Option<String>,
}

/// One entry of a package's `versions` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retracted: bool,
    pub archive_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_sha256: Option<String>,
    pub pubspec: Value,
}

/// Body of `GET /api/packages/{name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageResponse {
    pub name: String,
    #[serde(rename = "isDiscontinued", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_discontinued: bool,
    pub latest: VersionResponse,
    pub versions: Vec<VersionResponse>,
}

/// Phase 1 response: where the archive should be posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub url: String,
    pub fields: serde_json::Map<String, Value>,
}

/// Outcome of a successful finalize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedVersion {
    pub package: String,
    pub version: String,
    /// Canonical URL of the new version
    pub url: String,
}

/// Row of the paged package listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: String,
    pub latest: Option<String>,
    pub private: bool,
    pub download_count: u64,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageListResponse {
    pub packages: Vec<PackageSummary>,
}
