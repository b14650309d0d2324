//! Public URLs handed out to clients, all derived from the configured base URL.

use url::{form_urlencoded, Url};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrls {
    base: String,
    parsed: Url,
}

impl PublicUrls {
    /// Build from an absolute `http`/`https` base URL; a trailing slash is dropped.
    pub fn new(base_url: &str) -> AppResult<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AppError::InternalError(format!("invalid base URL {base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(AppError::InternalError(format!(
                "base URL must be an http(s) URL: {base_url}"
            )));
        }

        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            parsed,
        })
    }

    /// Base URL extended by `segments`, each percent-encoded as one segment.
    fn with_segments(&self, segments: &[&str]) -> String {
        let mut url = self.parsed.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Phase 1 target the archive is posted to.
    pub fn upload_url(&self) -> String {
        format!("{}/api/packages/versions/new", self.base)
    }

    /// Phase 3 URL carrying the finalize token.
    pub fn finalize_url(&self, token: &str) -> String {
        let token: String = form_urlencoded::byte_serialize(token.as_bytes()).collect();
        format!(
            "{}/api/packages/versions/newUploadFinish?upload_id={token}",
            self.base
        )
    }

    /// Canonical URL of a published version.
    pub fn version_url(&self, package: &str, version: &str) -> String {
        self.with_segments(&["packages", package, "versions", version])
    }

    pub fn archive_url(&self, package: &str, version: &str) -> String {
        self.with_segments(&["packages", package, "versions", version, "download"])
    }
}
