//! Gradio Space backend (Stable Diffusion on Hugging Face).
//!
//! A call is two requests: `POST .../call/<api>` queues the job and returns an
//! event id, `GET .../call/<api>/<event_id>` streams server-sent events until
//! `complete` or `error`. The finished image is copied into process temp
//! storage and handed back as a local path.

use std::path::Path;
use anyhow::{anyhow, bail, Context};
use log::{debug, info};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use dtv_core::{known_extension, GenerationRequest, GenerationResult, ImageProvider};
use crate::http::check_status;

pub const PROVIDER_ID: &str = "huggingface";

#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub space: String,
    pub base_url: Option<String>,
    pub api_name: String,
    pub token: Option<String>,
    pub steps: u32,
    pub guidance_scale: f32,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            space: "stabilityai/stable-diffusion-3.5-large-turbo".to_string(),
            base_url: None,
            api_name: "infer".to_string(),
            token: None,
            steps: 10,
            guidance_scale: 0.0,
        }
    }
}

impl HuggingFaceConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| space_base_url(&self.space))
    }
}

/// `owner/name.x` -> `https://owner-name-x.hf.space`
pub fn space_base_url(space: &str) -> String {
    let host: String = space
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("https://{host}.hf.space")
}

#[derive(Debug, Deserialize)]
struct QueuedCall {
    event_id: String,
}

pub struct HuggingFaceProvider {
    client: Client,
    config: HuggingFaceConfig,
}

impl HuggingFaceProvider {
    pub fn new(client: Client, config: HuggingFaceConfig) -> Self {
        Self { client, config }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn call_url(&self) -> String {
        format!("{}/gradio_api/call/{}", self.config.base_url(), self.config.api_name)
    }

    fn input_data(&self, request: &GenerationRequest) -> Value {
        let seed: Option<u64> = request.param("seed").and_then(|s| s.parse().ok());
        json!({
            "data": [
                request.prompt(),
                request.negative_prompt().unwrap_or(""),
                seed.unwrap_or(0),
                seed.is_none(),
                request.width(),
                request.height(),
                self.config.guidance_scale,
                self.config.steps,
            ]
        })
    }

    fn download_to_temp(&self, url: &str) -> anyhow::Result<std::path::PathBuf> {
        let ext = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| {
                Path::new(u.path())
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(known_extension)
            })
            .unwrap_or("webp");

        let mut response = check_status(
            self.authorized(self.client.get(url))
                .send()
                .context("Failed to download generated image")?,
        )?;

        let mut file = tempfile::Builder::new()
            .prefix("hf_generated_image_")
            .suffix(&format!(".{ext}"))
            .tempfile()
            .context("Failed to create temp file")?;
        let written = response
            .copy_to(file.as_file_mut())
            .context("Failed to write generated image")?;
        let (_, path) = file.keep().context("Failed to keep temp file")?;
        debug!("Wrote {written} bytes to {}", path.display());
        Ok(path)
    }
}

/// Data of the `complete` event; `error` events become errors.
fn parse_event_stream(body: &str) -> anyhow::Result<Value> {
    let mut event = "";
    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            match event {
                "complete" => {
                    return serde_json::from_str(data).context("Malformed completion data from Space");
                }
                "error" => bail!("Space reported an error: {}", data),
                _ => {}
            }
        }
    }
    Err(anyhow!("Space stream ended without a result"))
}

/// URL of the first output file of a completed call.
fn output_file_url(output: &Value, base_url: &str) -> anyhow::Result<String> {
    let first = output
        .get(0)
        .ok_or_else(|| anyhow!("Space returned no outputs"))?;

    if let Some(url) = first.get("url").and_then(Value::as_str) {
        return Ok(url.to_string());
    }
    let path = first
        .get("path")
        .and_then(Value::as_str)
        .or_else(|| first.as_str())
        .ok_or_else(|| anyhow!("Space output is not a file: {first}"))?;
    Ok(format!("{base_url}/gradio_api/file={path}"))
}

impl ImageProvider for HuggingFaceProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GenerationResult> {
        info!("Queueing generation on Space {}", self.config.space);
        let queued: QueuedCall = check_status(
            self.authorized(self.client.post(self.call_url()))
                .json(&self.input_data(request))
                .send()
                .context("Failed to reach Hugging Face Space")?,
        )?
        .json()
        .context("Failed to parse queue response")?;

        debug!("Space event id {}", queued.event_id);
        let stream = check_status(
            self.authorized(self.client.get(format!("{}/{}", self.call_url(), queued.event_id)))
                .send()
                .context("Failed to read Space results")?,
        )?
        .text()
        .context("Failed to read Space results")?;

        let output = parse_event_stream(&stream)?;
        let url = output_file_url(&output, &self.config.base_url())?;
        let path = self.download_to_temp(&url)?;

        info!("Hugging Face generated temporary image at {}", path.display());
        Ok(GenerationResult::local(PROVIDER_ID, path))
    }
}
