//! HTTP request handlers for the gallery server
//!
//! Every gallery operation blocks on the filesystem, so handlers hand the
//! work to `spawn_blocking` and translate [`GalleryError`] into a JSON
//! error body with the matching status code.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::gallery::{ConvertOutcome, Gallery, GalleryError, ImageInfo, RenameReport};

/// Shared server state
pub type SharedGallery = Arc<Gallery>;

/// Embedded single page UI
const INDEX_HTML: &str = include_str!("index.html");

/// Error response: `{"error": "..."}` with an HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not found")
    }
}

impl From<GalleryError> for ApiError {
    fn from(err: GalleryError) -> Self {
        let status =
            StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Run a blocking gallery operation off the async runtime
async fn blocking<T, F>(gallery: &SharedGallery, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Gallery) -> crate::gallery::Result<T> + Send + 'static,
{
    let gallery = Arc::clone(gallery);
    tokio::task::spawn_blocking(move || op(&gallery))
        .await
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("worker failed: {}", e),
            )
        })?
        .map_err(ApiError::from)
}

/// Parse a JSON request body; an empty body is read as `empty` when given
fn parse_body(body: &Bytes, empty: Option<Value>) -> ApiResult<Value> {
    if let Some(empty) = empty {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(empty);
        }
    }
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("invalid json"))
}

/// Loose truthiness for optional flags (`1`, `"yes"`, `true`, ...)
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Deserialize)]
pub struct ImagesQuery {
    only_unused: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImagesResponse {
    folder: String,
    images: Vec<ImageInfo>,
}

/// GET /api/images?only_unused={0|1}
pub async fn list_images(
    State(gallery): State<SharedGallery>,
    Query(query): Query<ImagesQuery>,
) -> ApiResult<Json<ImagesResponse>> {
    let only_unused = matches!(
        query.only_unused.as_deref(),
        Some("1") | Some("true") | Some("yes")
    );
    let images = blocking(&gallery, move |g| g.list_images(only_unused)).await?;

    Ok(Json(ImagesResponse {
        folder: gallery.folder().display().to_string(),
        images,
    }))
}

/// POST /api/mark `{name, used}`
pub async fn mark(State(gallery): State<SharedGallery>, body: Bytes) -> ApiResult<Json<Value>> {
    let payload = parse_body(&body, None)?;
    let (Some(name), Some(used)) = (
        payload.get("name").and_then(Value::as_str),
        payload.get("used").and_then(Value::as_bool),
    ) else {
        return Err(ApiError::bad_request(
            "expected {name: string, used: boolean}",
        ));
    };

    let name = name.to_string();
    blocking(&gallery, move |g| g.mark(&name, used)).await?;
    Ok(Json(json!({ "ok": true })))
}

/// POST /api/rename `{dry_run?}`
pub async fn rename(
    State(gallery): State<SharedGallery>,
    body: Bytes,
) -> ApiResult<Json<RenameReport>> {
    let payload = parse_body(&body, Some(json!({})))?;
    if !payload.is_object() {
        return Err(ApiError::bad_request("expected {dry_run?: boolean}"));
    }
    let dry_run = is_truthy(payload.get("dry_run"));

    let report = blocking(&gallery, move |g| g.rename_all(dry_run)).await?;
    Ok(Json(report))
}

/// POST /api/convert `{name, format?}`
pub async fn convert(
    State(gallery): State<SharedGallery>,
    body: Bytes,
) -> ApiResult<Json<ConvertOutcome>> {
    let payload = parse_body(&body, Some(json!({})))?;
    let name = payload.get("name").and_then(Value::as_str);
    let format = match payload.get("format") {
        None => Some("jpg"),
        Some(value) => value.as_str(),
    };
    let (Some(name), Some(format)) = (name, format) else {
        return Err(ApiError::bad_request(
            "expected {name: string, format: string}",
        ));
    };
    if !matches!(format.to_lowercase().as_str(), "jpg" | "jpeg") {
        return Err(ApiError::bad_request("only jpg supported"));
    }

    let name = name.to_string();
    let outcome = blocking(&gallery, move |g| g.convert(&name)).await?;
    Ok(Json(outcome))
}

/// GET /img/:name
pub async fn image(
    State(gallery): State<SharedGallery>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let image = blocking(&gallery, move |g| g.read_image(&name)).await?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.data).into_response())
}

/// Anything else
pub async fn not_found() -> ApiError {
    ApiError::not_found()
}
