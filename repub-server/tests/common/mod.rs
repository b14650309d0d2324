//! Common test utilities and helpers
//!
//! Shared archive builders, a configured in-memory repository behind an
//! `axum-test` server, and store doubles that inject failures.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum_test::{
    multipart::{MultipartForm, Part},
    TestResponse, TestServer,
};
use flate2::{write::GzEncoder, Compression};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use repub_server::config::{Config, TokenConfig};
use repub_server::models::{NewPackageVersion, Package, PackageId, PackageVersion};
use repub_server::storage::{BlobStore, MemoryBlobStore};
use repub_server::store::{MemoryPackageStore, PackageStore, StoreError, StoreResult};
use repub_server::{build_router, AppState};

pub const BASE_URL: &str = "http://localhost:9090";
pub const ALICE: &str = "alice-secret";
pub const BOB: &str = "bob-secret";
pub const READER: &str = "reader-secret";

/// Build a gzipped tar archive from `(path, content)` pairs.
pub fn build_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .expect("should append tar entry");
    }
    builder
        .into_inner()
        .expect("should finish tar stream")
        .finish()
        .expect("should finish gzip stream")
}

/// Archive laid out the way `dart pub publish` produces it.
pub fn package_archive(name: &str, version: &str) -> Vec<u8> {
    let root = format!("{name}-{version}");
    let pubspec = format!("name: {name}\nversion: {version}\ndescription: Test package\n");
    let manifest_path = format!("{root}/pubspec.yaml");
    let readme_path = format!("{root}/README.md");
    let changelog_path = format!("{root}/CHANGELOG.md");
    let library_path = format!("{root}/lib/{name}.dart");
    build_archive(&[
        (manifest_path.as_str(), pubspec.as_str()),
        (readme_path.as_str(), "Hello"),
        (changelog_path.as_str(), "## 1.0.0\n- Initial"),
        (library_path.as_str(), "void main() {}"),
    ])
}

pub fn test_config() -> Config {
    let token = |name: &str, value: &str| TokenConfig {
        name: name.to_string(),
        value: value.to_string(),
    };

    let mut config = Config::default();
    config.server.base_url = BASE_URL.to_string();
    config.auth.write_tokens = vec![token("alice", ALICE), token("bob", BOB)];
    config.auth.read_tokens = vec![token("reader", READER)];
    config
}

/// In-memory repository served through `axum-test`.
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<dyn PackageStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryPackageStore::new()))
    }

    pub fn with_store(config: Config, store: Arc<dyn PackageStore>) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        let state = Arc::new(
            AppState::new(config, Arc::clone(&store), blobs.clone())
                .expect("should build app state"),
        );
        let server =
            TestServer::new(build_router(Arc::clone(&state))).expect("should create test server");

        Self {
            server,
            store,
            blobs,
            state,
        }
    }

    /// Phase 2: post `archive` as the `file` field.
    pub async fn upload(&self, token: &str, archive: Vec<u8>) -> TestResponse {
        let part = Part::bytes(archive)
            .file_name("package.tar.gz")
            .mime_type("application/octet-stream");
        let form = MultipartForm::new().add_part("file", part);

        self.server
            .post("/api/packages/versions/new")
            .add_header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .await
    }

    /// Phase 3 for an explicit token.
    pub async fn finalize(&self, token: &str, upload_id: &str) -> TestResponse {
        self.server
            .get("/api/packages/versions/newUploadFinish")
            .add_query_param("upload_id", upload_id)
            .add_header("Authorization", format!("Bearer {token}"))
            .await
    }

    /// Upload and finalize in one go, returning the finalize response.
    pub async fn publish(&self, token: &str, archive: Vec<u8>) -> TestResponse {
        let upload = self.upload(token, archive).await;
        assert_eq!(upload.status_code(), StatusCode::NO_CONTENT);
        let upload_id = upload_id_from(&upload);
        self.finalize(token, &upload_id).await
    }

    pub async fn get(&self, token: &str, path: &str) -> TestResponse {
        self.server
            .get(path)
            .add_header("Authorization", format!("Bearer {token}"))
            .await
    }
}

/// Read the finalize token out of a phase 2 `Location` header.
pub fn upload_id_from(response: &TestResponse) -> String {
    let location = response
        .headers()
        .get(header::LOCATION)
        .expect("upload should set Location")
        .to_str()
        .expect("location should be ascii");
    let url = url::Url::parse(location).expect("location should be an absolute URL");
    assert!(location.starts_with(BASE_URL));
    assert_eq!(url.path(), "/api/packages/versions/newUploadFinish");
    url.query_pairs()
        .find(|(key, _)| key == "upload_id")
        .map(|(_, value)| value.into_owned())
        .expect("location should carry upload_id")
}

/// Error code of a pub error body.
pub fn error_code(response: &TestResponse) -> String {
    let body: serde_json::Value = response.json();
    body["error"]["code"]
        .as_str()
        .expect("error body should carry a code")
        .to_string()
}

pub fn error_message(response: &TestResponse) -> String {
    let body: serde_json::Value = response.json();
    body["error"]["message"]
        .as_str()
        .expect("error body should carry a message")
        .to_string()
}

pub async fn blob_exists(blobs: &MemoryBlobStore, key: &str) -> bool {
    blobs.exists(key).await.expect("exists should not fail")
}

/// How [`FailingVersionStore`] rejects `create_version`.
#[derive(Debug, Clone, Copy)]
pub enum VersionFailure {
    /// A backend error, as from a lost connection
    Backend,
    /// A unique constraint violation, as from a racing finalize
    Duplicate,
}

/// Memory store whose `create_version` always fails.
pub struct FailingVersionStore {
    inner: MemoryPackageStore,
    failure: VersionFailure,
}

impl FailingVersionStore {
    pub fn new(failure: VersionFailure) -> Self {
        Self {
            inner: MemoryPackageStore::new(),
            failure,
        }
    }
}

#[async_trait]
impl PackageStore for FailingVersionStore {
    async fn get_package(&self, name: &str) -> StoreResult<Option<Package>> {
        self.inner.get_package(name).await
    }

    async fn create_package(&self, name: &str, private: bool) -> StoreResult<Package> {
        self.inner.create_package(name, private).await
    }

    async fn list_packages(&self, limit: usize, offset: usize) -> StoreResult<Vec<Package>> {
        self.inner.list_packages(limit, offset).await
    }

    async fn count_packages(&self) -> StoreResult<usize> {
        self.inner.count_packages().await
    }

    async fn get_versions(&self, package_id: PackageId) -> StoreResult<Vec<PackageVersion>> {
        self.inner.get_versions(package_id).await
    }

    async fn create_version(&self, version: NewPackageVersion) -> StoreResult<PackageVersion> {
        match self.failure {
            VersionFailure::Backend => Err(StoreError::Backend("connection reset".to_string())),
            VersionFailure::Duplicate => Err(StoreError::DuplicateVersion {
                package: format!("package-{}", version.package_id),
                version: version.version,
            }),
        }
    }

    async fn get_uploaders(&self, package_id: PackageId) -> StoreResult<Vec<String>> {
        self.inner.get_uploaders(package_id).await
    }

    async fn add_uploader(&self, package_id: PackageId, uploader: &str) -> StoreResult<()> {
        self.inner.add_uploader(package_id, uploader).await
    }

    async fn record_download(&self, package_id: PackageId, version: &str) -> StoreResult<()> {
        self.inner.record_download(package_id, version).await
    }
}

/// Memory store whose version listing can be switched to return nothing,
/// the view a finalize has when another one commits the same version
/// between its duplicate check and its own writes.
#[derive(Default)]
pub struct StaleVersionsStore {
    inner: MemoryPackageStore,
    stale: AtomicBool,
}

impl StaleVersionsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stale(&self, stale: bool) {
        self.stale.store(stale, Ordering::SeqCst);
    }
}

#[async_trait]
impl PackageStore for StaleVersionsStore {
    async fn get_package(&self, name: &str) -> StoreResult<Option<Package>> {
        self.inner.get_package(name).await
    }

    async fn create_package(&self, name: &str, private: bool) -> StoreResult<Package> {
        self.inner.create_package(name, private).await
    }

    async fn list_packages(&self, limit: usize, offset: usize) -> StoreResult<Vec<Package>> {
        self.inner.list_packages(limit, offset).await
    }

    async fn count_packages(&self) -> StoreResult<usize> {
        self.inner.count_packages().await
    }

    async fn get_versions(&self, package_id: PackageId) -> StoreResult<Vec<PackageVersion>> {
        if self.stale.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner.get_versions(package_id).await
    }

    async fn create_version(&self, version: NewPackageVersion) -> StoreResult<PackageVersion> {
        self.inner.create_version(version).await
    }

    async fn get_uploaders(&self, package_id: PackageId) -> StoreResult<Vec<String>> {
        self.inner.get_uploaders(package_id).await
    }

    async fn add_uploader(&self, package_id: PackageId, uploader: &str) -> StoreResult<()> {
        self.inner.add_uploader(package_id, uploader).await
    }

    async fn record_download(&self, package_id: PackageId, version: &str) -> StoreResult<()> {
        self.inner.record_download(package_id, version).await
    }
}
