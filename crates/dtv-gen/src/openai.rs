use anyhow::{anyhow, Context};
use base64::{engine::general_purpose, Engine};
use log::info;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use dtv_core::{GenerationRequest, GenerationResult, ImageProvider, Orientation};
use crate::http::{check_status, persist_temp};

pub const PROVIDER_ID: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "dall-e-3".to_string(),
            base_url: "https://api.openai.com".to_string(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

/// OpenAI image generation (`/v1/images/generations`).
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(client: Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/images/generations", self.config.base_url.trim_end_matches('/'))
    }
}

/// Closest supported size for the requested orientation.
fn size_for(request: &GenerationRequest) -> &str {
    if let Some(size) = request.param("size") {
        return size;
    }
    match request.orientation() {
        Orientation::Landscape => "1792x1024",
        Orientation::Portrait => "1024x1792",
        Orientation::Square => "1024x1024",
    }
}

fn build_body<'a>(model: &'a str, request: &'a GenerationRequest) -> ImagesRequest<'a> {
    ImagesRequest {
        model,
        prompt: request.prompt(),
        n: 1,
        size: size_for(request),
        quality: request.param("quality"),
        style: request.param("style"),
    }
}

fn into_result(response: ImagesResponse) -> anyhow::Result<GenerationResult> {
    let image = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("OpenAI API response does not contain image data"))?;

    if let Some(url) = image.url.filter(|u| !u.is_empty()) {
        return Ok(GenerationResult::remote(PROVIDER_ID, url));
    }
    if let Some(b64) = image.b64_json {
        let bytes = general_purpose::STANDARD
            .decode(b64.as_bytes())
            .context("OpenAI returned invalid base64 image data")?;
        let path = persist_temp("openai_generated_image_", "png", &bytes)?;
        return Ok(GenerationResult::local(PROVIDER_ID, path));
    }
    Err(anyhow!("OpenAI API response does not contain an image URL"))
}

impl ImageProvider for OpenAiProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GenerationResult> {
        let body = build_body(&self.config.model, request);
        info!("Requesting {} image from OpenAI ({})", body.size, self.config.model);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .context("Failed to reach OpenAI")?;
        let parsed: ImagesResponse = check_status(response)?
            .json()
            .context("Failed to parse OpenAI response")?;

        into_result(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtv_core::SourceKind;

    #[test]
    fn test_size_follows_orientation() {
        let wide = GenerationRequest::new("p", 2048, 1152).unwrap();
        let tall = GenerationRequest::new("p", 1152, 2048).unwrap();
        let fixed = GenerationRequest::new("p", 2048, 1152).unwrap().with_param("size", "1024x1024");
        assert_eq!(size_for(&wide), "1792x1024");
        assert_eq!(size_for(&tall), "1024x1792");
        assert_eq!(size_for(&fixed), "1024x1024");
    }

    #[test]
    fn test_body_shape() {
        let req = GenerationRequest::new("tropical sunset", 2048, 1152)
            .unwrap()
            .with_param("style", "natural");
        let body = serde_json::to_value(build_body("dall-e-3", &req)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "dall-e-3",
                "prompt": "tropical sunset",
                "n": 1,
                "size": "1792x1024",
                "style": "natural"
            })
        );
    }

    #[test]
    fn test_url_response() {
        let parsed: ImagesResponse =
            serde_json::from_str(r#"{"created":1,"data":[{"url":"https://oai.example/img.png"}]}"#).unwrap();
        let result = into_result(parsed).unwrap();
        assert_eq!(result, GenerationResult::remote("openai", "https://oai.example/img.png"));
    }

    #[test]
    fn test_b64_response_lands_in_temp_file() {
        let parsed: ImagesResponse = serde_json::from_str(r#"{"data":[{"b64_json":"aGVsbG8="}]}"#).unwrap();
        let result = into_result(parsed).unwrap();
        assert_eq!(result.source_kind, SourceKind::LocalTempPath);
        assert_eq!(std::fs::read(&result.location).unwrap(), b"hello");
        std::fs::remove_file(&result.location).unwrap();
    }

    #[test]
    fn test_empty_response() {
        let parsed: ImagesResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(into_result(parsed).is_err());
    }
}
