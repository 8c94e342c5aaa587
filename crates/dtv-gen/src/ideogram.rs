use anyhow::{anyhow, bail, Context};
use log::{error, info};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use dtv_core::{GenerationRequest, GenerationResult, ImageProvider};
use crate::http::check_status;

pub const PROVIDER_ID: &str = "ideogram";

#[derive(Debug, Clone)]
pub struct IdeogramConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub style_type: String,
    pub magic_prompt_option: String,
    pub aspect_ratio: Option<String>,
}

impl IdeogramConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: "https://api.ideogram.ai/generate".to_string(),
            model: "V_2".to_string(),
            style_type: "AUTO".to_string(),
            magic_prompt_option: "AUTO".to_string(),
            aspect_ratio: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    image_request: ImageRequest<'a>,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    magic_prompt_option: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    style_type: &'a str,
    aspect_ratio: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

/// Ideogram text-to-image API.
pub struct IdeogramProvider {
    client: Client,
    config: IdeogramConfig,
}

impl IdeogramProvider {
    pub fn new(client: Client, config: IdeogramConfig) -> Self {
        Self { client, config }
    }

    fn build_body<'a>(&'a self, request: &'a GenerationRequest) -> GenerateBody<'a> {
        let aspect_ratio = request
            .param("aspect_ratio")
            .map(str::to_string)
            .or_else(|| self.config.aspect_ratio.clone())
            .unwrap_or_else(|| aspect_ratio_for(request.width(), request.height()));

        GenerateBody {
            image_request: ImageRequest {
                prompt: request.prompt(),
                model: &self.config.model,
                magic_prompt_option: &self.config.magic_prompt_option,
                negative_prompt: request.negative_prompt(),
                style_type: request.param("style_type").unwrap_or(&self.config.style_type),
                aspect_ratio,
            },
        }
    }
}

/// Ratios the `generate` endpoint accepts.
const SUPPORTED_RATIOS: [(u32, u32); 11] = [
    (1, 1),
    (16, 9),
    (9, 16),
    (16, 10),
    (10, 16),
    (3, 2),
    (2, 3),
    (4, 3),
    (3, 4),
    (3, 1),
    (1, 3),
];

/// The supported `ASPECT_<w>_<h>` closest to `width:height`.
fn aspect_ratio_for(width: u32, height: u32) -> String {
    let target = (width.max(1) as f64 / height.max(1) as f64).ln();
    let distance = |&(w, h): &(u32, u32)| ((w as f64 / h as f64).ln() - target).abs();
    let (w, h) = SUPPORTED_RATIOS
        .iter()
        .min_by(|a, b| distance(*a).total_cmp(&distance(*b)))
        .copied()
        .unwrap_or((1, 1));
    format!("ASPECT_{w}_{h}")
}

impl ImageProvider for IdeogramProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GenerationResult> {
        let body = self.build_body(request);
        info!("Making request to Ideogram API with prompt: {}", request.prompt());

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Api-Key", &self.config.api_key)
            .json(&body)
            .send()
            .context("Failed to connect to Ideogram API")?;

        info!("Ideogram API response status: {}", response.status());
        if response.status() == StatusCode::NOT_FOUND {
            error!("Ideogram API endpoint not found (404)");
            bail!("Ideogram API endpoint not found, check the API URL");
        }

        let parsed: GenerateResponse = check_status(response)?
            .json()
            .context("Failed to parse Ideogram response")?;
        let url = parsed
            .data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("No image URL in Ideogram response"))?;

        Ok(GenerationResult::remote(PROVIDER_ID, url))
    }
}
