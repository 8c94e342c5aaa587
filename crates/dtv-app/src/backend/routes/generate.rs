use std::sync::Arc;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use log::info;
use crate::backend::routes::{blocking, required, ApiError};
use crate::backend::schemas::{GenerateImageRequest, GenerateImageResponse, PromptResponse};
use crate::backend::state::AppState;
use crate::runner;

pub async fn generate_prompt(State(state): State<Arc<AppState>>) -> Result<Json<PromptResponse>, ApiError> {
    let prompt = blocking(&state, |state| {
        let generator = state
            .prompt_generator
            .as_ref()
            .ok_or_else(|| ApiError::bad_request("prompt generation needs OPENROUTER_API_KEY and OPENROUTER_MODEL"))?;
        generator
            .generate()
            .map_err(|e| ApiError::internal(format!("prompt generation failed: {e:#}")))
    })
    .await?;
    Ok(Json(PromptResponse { success: true, prompt }))
}

pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    let Json(body) = body?;
    let prompt = required(body.prompt, "No prompt provided")?;
    let request = runner::build_request(&state.config, prompt)?;

    let (generated, stored) = blocking(&state, move |state| {
        if state.pipeline.chain().is_empty() {
            return Err(ApiError::internal("no image providers are configured"));
        }
        Ok(state.pipeline.generate_and_fetch(&request, &state.config.images_folder)?)
    })
    .await?;

    let file_name = stored
        .file_name()
        .ok_or_else(|| ApiError::internal(format!("stored image {} has no file name", stored.path.display())))?;
    info!("Generated {file_name} with {}", generated.provider_id);

    Ok(Json(GenerateImageResponse {
        success: true,
        image_url: format!("/images/{file_name}"),
        provider: generated.provider_id,
    }))
}
