use std::path::Path;
use std::sync::Arc;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use log::info;
use dtv_core::{GenerationResult, UploadOutcome};
use crate::backend::routes::{blocking, required, ApiError};
use crate::backend::schemas::{CheckTvRequest, CheckTvResponse, PushRequest, PushResponse, UploadRequest};
use crate::backend::state::{lock, AppState};

pub async fn push_to_tv(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, ApiError> {
    let Json(body) = body?;
    let image_url = required(body.image_url, "Invalid image URL")?;
    let tv_ip = required(body.tv_ip, "TV IP address is required")?;

    let outcome = blocking(&state, move |state| push_image_url(state, &image_url, &tv_ip)).await?;
    Ok(Json(push_response(outcome)))
}

pub async fn check_tv_ip(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CheckTvRequest>, JsonRejection>,
) -> Result<Json<CheckTvResponse>, ApiError> {
    let Json(body) = body?;
    let tv_ip = required(body.tv_ip, "TV IP is required")?;

    let api_version = blocking(&state, move |state| {
        let device = state.device_lock(&tv_ip);
        let _guard = lock(&device);
        state
            .pusher
            .connector()
            .api_version(&tv_ip)
            .map_err(|e| ApiError::internal(format!("TV at {tv_ip} is not reachable: {e}")))
    })
    .await?;
    Ok(Json(CheckTvResponse {
        success: true,
        api_version,
    }))
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<PushResponse>, ApiError> {
    let Json(body) = body?;
    let image_path = required(body.image_path, "image_path is required")?;

    let outcome = blocking(&state, move |state| {
        let path = Path::new(&image_path);
        if !path.is_file() {
            return Err(ApiError::not_found(format!("image file not found: {image_path}")));
        }
        let tv_ip = state
            .config
            .tv
            .ip
            .as_deref()
            .ok_or_else(|| ApiError::internal("TV_IP is not configured"))?;
        push_file(state, path, tv_ip)
    })
    .await?;
    Ok(Json(push_response(outcome)))
}

/// Pushes a gallery image (`/images/<file>`) or a remote URL.
///
/// Remote images are downloaded into a scratch directory that is removed
/// once the push finishes, whatever its outcome.
fn push_image_url(state: &AppState, image_url: &str, tv_ip: &str) -> Result<UploadOutcome, ApiError> {
    if let Some(file) = image_url.strip_prefix("/images/") {
        let path = state
            .image_path(file)
            .ok_or_else(|| ApiError::bad_request(format!("invalid image name `{file}`")))?;
        if !path.is_file() {
            return Err(ApiError::not_found(format!("image `{file}` not found")));
        }
        return push_file(state, &path, tv_ip);
    }

    if !is_remote_url(image_url) {
        return Err(ApiError::bad_request("Invalid image URL"));
    }
    let scratch = tempfile::tempdir().map_err(|e| ApiError::internal(format!("failed to create temp dir: {e}")))?;
    let stored = state
        .fetcher
        .fetch(&GenerationResult::remote("remote", image_url), scratch.path())?;
    push_file(state, &stored.path, tv_ip)
}

fn push_file(state: &AppState, path: &Path, tv_ip: &str) -> Result<UploadOutcome, ApiError> {
    let device = state.device_lock(tv_ip);
    let _guard = lock(&device);
    let outcome = state.pusher.push(path, tv_ip, &state.config.tv.style)?;
    info!("Pushed {} to {tv_ip} as {}", path.display(), outcome.content_id);
    Ok(outcome)
}

fn is_remote_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn push_response(outcome: UploadOutcome) -> PushResponse {
    PushResponse {
        success: true,
        message: outcome
            .selection_error
            .map(|reason| format!("uploaded, but the TV did not confirm selection: {reason}")),
        content_id: outcome.content_id,
        selected: outcome.selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use crate::backend::routes::test_support::{state, status};

    fn push(image_url: &str, tv_ip: Option<&str>) -> Result<Json<PushRequest>, JsonRejection> {
        Ok(Json(PushRequest {
            image_url: Some(image_url.to_string()),
            tv_ip: tv_ip.map(str::to_string),
        }))
    }

    #[tokio::test]
    async fn test_upload_requires_image_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Some("10.0.0.2")).await;
        let result = upload(State(state), Ok(Json(UploadRequest::default()))).await;
        assert_eq!(status(result), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Some("10.0.0.2")).await;
        let body = UploadRequest {
            image_path: Some(dir.path().join("nope.png").display().to_string()),
        };
        let err = upload(State(state), Ok(Json(body))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(err.message.contains("nope.png"));
    }

    #[tokio::test]
    async fn test_upload_without_tv_ip_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"png").unwrap();
        let state = state(dir.path(), None).await;
        let body = UploadRequest {
            image_path: Some(image.display().to_string()),
        };
        let err = upload(State(state), Ok(Json(body))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "TV_IP is not configured");
    }

    #[tokio::test]
    async fn test_push_rejects_traversal_and_foreign_urls() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None).await;

        for url in ["/images/../x.png", "/images/nested/x.png", "ftp://host/x.png", "file:///etc/passwd", "x.png"] {
            let result = push_to_tv(State(Arc::clone(&state)), push(url, Some("10.0.0.2"))).await;
            assert_eq!(status(result), StatusCode::BAD_REQUEST, "{url}");
        }
    }

    #[tokio::test]
    async fn test_push_requires_tv_ip() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None).await;
        let err = push_to_tv(State(state), push("/images/a.png", None)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "TV IP address is required");
    }

    #[tokio::test]
    async fn test_push_missing_gallery_image_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None).await;
        let result = push_to_tv(State(state), push("/images/missing.png", Some("10.0.0.2"))).await;
        assert_eq!(status(result), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_check_tv_ip_requires_address() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None).await;
        let body = CheckTvRequest { tv_ip: Some("  ".into()) };
        let result = check_tv_ip(State(state), Ok(Json(body))).await;
        assert_eq!(status(result), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_remote_url_detection() {
        assert!(is_remote_url("https://cdn.example.com/a.png"));
        assert!(!is_remote_url("file:///etc/passwd"));
        assert!(!is_remote_url("images/a.png"));
    }

    #[test]
    fn test_unconfirmed_selection_is_reported() {
        let response = push_response(UploadOutcome {
            content_id: "MY_F0001".into(),
            selected: false,
            selection_error: Some("timed out".into()),
        });
        assert!(response.success);
        assert!(!response.selected);
        assert!(response.message.unwrap().contains("timed out"));
    }
}
