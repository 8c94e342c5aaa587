use std::sync::Arc;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::error;
use dtv_core::{ComposeError, FetchError, PipelineError, PushError, RequestError};
use crate::backend::schemas::ErrorResponse;
use crate::backend::state::AppState;

mod generate;
mod images;
mod tv;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/images/{file}", get(images::serve_image))
        .route("/api/list-images", get(images::list_images))
        .route("/api/list-local-images", get(images::list_images))
        .route("/api/combine-logo", post(images::combine_logo))
        .route("/api/generate-prompt", post(generate::generate_prompt))
        .route("/api/generate-image", post(generate::generate_image))
        .route("/api/push-to-tv", post(tv::push_to_tv))
        .route("/api/check-tv-ip", post(tv::check_tv_ip))
        .route("/upload", post(tv::upload))
}

/// Error reply rendered as `{success: false, error}`.
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

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{}", self.message);
        }
        let body = ErrorResponse {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<PushError> for ApiError {
    fn from(e: PushError) -> Self {
        match e {
            PushError::InvalidInput(_) => Self::bad_request(e.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<ComposeError> for ApiError {
    fn from(e: ComposeError) -> Self {
        match e {
            ComposeError::LogoNotPng { .. } | ComposeError::EmptyLogo { .. } => Self::bad_request(e.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self::internal(format!("{} stage failed: {e}", e.stage().as_str()))
    }
}

/// Runs blocking pipeline work off the async executor.
pub async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| ApiError::internal(format!("worker task failed: {e}")))?
}

/// Trimmed, non-empty value of an optional body field.
pub fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::Arc;
    use axum::http::StatusCode;
    use crate::backend::state::AppState;
    use crate::config::AppConfig;
    use super::ApiError;

    /// Server state over `images_folder`, built off the runtime since it
    /// owns a blocking HTTP client.
    pub async fn state(images_folder: &Path, tv_ip: Option<&str>) -> Arc<AppState> {
        let mut config = AppConfig::from_lookup(|key| (key == "PROVIDERS").then(|| "huggingface".to_string())).unwrap();
        config.images_folder = images_folder.to_path_buf();
        config.tv.ip = tv_ip.map(str::to_string);
        let state = tokio::task::spawn_blocking(move || AppState::new(config)).await.unwrap().unwrap();
        Arc::new(state)
    }

    pub fn status<T: std::fmt::Debug>(result: Result<T, ApiError>) -> StatusCode {
        result.unwrap_err().status
    }
}
