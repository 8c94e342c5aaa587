use std::io;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use dtv_core::compose::{self, combined_path};
use dtv_core::gallery;
use crate::backend::routes::{blocking, required, ApiError};
use crate::backend::schemas::{CombineLogoRequest, CombineLogoResponse, ImageListResponse};
use crate::backend::state::AppState;

pub async fn serve_image(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state
        .image_path(&file)
        .ok_or_else(|| ApiError::bad_request(format!("invalid image name `{file}`")))?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ApiError::not_found(format!("image `{file}` not found")),
        _ => ApiError::internal(format!("failed to read {}: {e}", path.display())),
    })?;
    Ok(([(CONTENT_TYPE, content_type(&path))], bytes))
}

pub async fn list_images(State(state): State<Arc<AppState>>) -> Result<Json<ImageListResponse>, ApiError> {
    let images = blocking(&state, |state| {
        gallery::list_images(&state.config.images_folder).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ApiError::not_found("Images folder not found"),
            _ => ApiError::internal(format!("failed to list images: {e}")),
        })
    })
    .await?;
    Ok(Json(ImageListResponse { success: true, images }))
}

/// Places a PNG logo on a stored image and returns the combined image URL.
pub async fn combine_logo(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CombineLogoRequest>, JsonRejection>,
) -> Result<Json<CombineLogoResponse>, ApiError> {
    let Json(body) = body?;
    let image_url = required(body.image_url, "Image URL is required")?;
    let file = image_url.strip_prefix("/images/").unwrap_or(&image_url);
    let background = state
        .image_path(file)
        .ok_or_else(|| ApiError::bad_request(format!("invalid image name `{file}`")))?;
    let logo = body
        .logo_path
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| state.config.logo_path.clone())
        .ok_or_else(|| ApiError::bad_request("Logo path is required"))?;

    let combined = blocking(&state, move |_| {
        if !logo.is_file() {
            return Err(ApiError::not_found(format!("logo not found: {}", logo.display())));
        }
        if !background.is_file() {
            return Err(ApiError::not_found(format!("image `{}` not found", background.display())));
        }
        let combined = combined_path(&background);
        compose::combine_logo(&logo, &background, &combined)?;
        Ok(combined)
    })
    .await?;

    let name = combined
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ApiError::internal("combined image has no file name"))?;
    Ok(Json(CombineLogoResponse {
        success: true,
        image_url: format!("/images/{name}"),
    }))
}

fn content_type(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
