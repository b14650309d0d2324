//! HTTP handlers of the hosted repository API.
//!
//! JSON bodies are sent with content type `application/vnd.pub.v2+json`
//! through [`PubJson`]; failures go through [`AppError`]'s response mapping.

use axum::{
    body::Body,
    extract::{
        multipart::{Multipart, MultipartRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::Identity;
use crate::error::{AppError, AppResult, PUB_CONTENT_TYPE};
use crate::state::{AppState, SuccessResponse};
use crate::validation::MAX_MULTIPART_FIELDS;

const DEFAULT_PAGE: usize = 1;
const DEFAULT_PAGE_SIZE: usize = 20;

/// Form field carrying the package archive.
const ARCHIVE_FIELD: &str = "file";

/// JSON response with the pub API content type.
pub struct PubJson<T>(pub T);

impl<T: Serialize> IntoResponse for PubJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => ([(header::CONTENT_TYPE, PUB_CONTENT_TYPE)], body).into_response(),
            Err(e) => AppError::from(e).into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeQuery {
    pub upload_id: Option<String>,
}

/// `GET /api/packages/{name}`
pub async fn get_package(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<impl IntoResponse> {
    debug!(package = %name, "Fetching package metadata");
    let package = state
        .query
        .get_package(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Package {name} not found")))?;
    Ok(PubJson(package))
}

/// `GET /api/packages/{name}/versions/{version}`
pub async fn get_version(
    State(state): State<Arc<AppState>>,
    Path((name, version)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let response = state
        .query
        .get_version(&name, &version)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Package {name} version {version} not found"))
        })?;
    Ok(PubJson(response))
}

/// `GET /api/packages?page=&size=`
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let page = params.page.unwrap_or(DEFAULT_PAGE);
    let size = params.size.unwrap_or(DEFAULT_PAGE_SIZE);
    Ok(PubJson(state.query.list_packages(page, size).await?))
}

/// `GET /packages/{name}/versions/{version}/download`
pub async fn download_archive(
    State(state): State<Arc<AppState>>,
    Path((name, version)): Path<(String, String)>,
) -> AppResult<Response> {
    let download = state.query.download(&name, &version).await?;
    info!(package = %name, version = %version, "Serving package archive");

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.file_name),
            ),
        ],
        Body::from_stream(download.body),
    )
        .into_response())
}

/// `GET /api/packages/versions/new`: phase 1 of a publish.
pub async fn new_upload(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    PubJson(state.publish.upload_target())
}

/// `POST /api/packages/versions/new`: phase 2, stage the archive.
///
/// Responds `204 No Content` with the finalize URL in `Location`.
pub async fn upload_archive(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let mut multipart =
        multipart.map_err(|e| AppError::MalformedRequest(format!("expected multipart body: {e}")))?;

    let mut field_count = 0;
    let mut archive = None;

    while let Some(field) = multipart.next_field().await? {
        field_count += 1;
        if field_count > MAX_MULTIPART_FIELDS {
            warn!(field_count, "Too many multipart fields");
            return Err(AppError::MalformedRequest(format!(
                "Too many multipart fields (max: {MAX_MULTIPART_FIELDS})"
            )));
        }

        let name = field.name().unwrap_or("").to_string();
        debug!(field_name = %name, "Processing multipart field");

        if name == ARCHIVE_FIELD {
            let data = field.bytes().await?;
            debug!(size = data.len(), "Read package archive");
            archive = Some(data.to_vec());
        }
    }

    let archive = archive.ok_or_else(|| {
        AppError::MalformedRequest(format!("missing multipart field '{ARCHIVE_FIELD}'"))
    })?;

    let token = state.publish.stage_upload(archive, identity.name());
    let finalize_url = state.publish.finalize_url(&token);
    info!(uploader = identity.name(), "Package upload received, awaiting finalization");

    Ok((StatusCode::NO_CONTENT, [(header::LOCATION, finalize_url)]).into_response())
}

/// `GET /api/packages/versions/newUploadFinish?upload_id=`: phase 3.
pub async fn finalize_upload(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FinalizeQuery>,
) -> AppResult<impl IntoResponse> {
    let upload_id = params
        .upload_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::MalformedRequest("Missing upload_id parameter".to_string()))?;

    let published = state.publish.finalize(&upload_id).await?;
    info!(
        package = %published.package,
        version = %published.version,
        url = %published.url,
        "Upload finalized"
    );

    Ok(PubJson(SuccessResponse::new("Package published successfully")))
}
