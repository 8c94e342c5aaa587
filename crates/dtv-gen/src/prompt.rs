use anyhow::{anyhow, Context};
use log::info;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use crate::http::check_status;

const SYSTEM_PROMPT: &str = "You are a wallpaper specialist and artist, look at this list of possible wallpaper prompts. \
Provide one of your own that keeps the essence of the original prompts in terms of realistic and artistic photography. \
Provide only the prompt itself without any intro at all.";

#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    /// Example prompts the model riffs on.
    pub seeds: Vec<String>,
}

/// Asks a chat-completion model for a fresh wallpaper prompt.
pub struct PromptGenerator {
    client: Client,
    config: PromptConfig,
}

impl PromptGenerator {
    pub fn new(client: Client, config: PromptConfig) -> Self {
        Self { client, config }
    }

    pub fn generate(&self) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&build_body(&self.config.model, &self.config.seeds))
            .send()
            .context("Failed to reach prompt model")?;
        let payload: Value = check_status(response)?
            .json()
            .context("Failed to parse prompt model response")?;

        let prompt = extract_prompt(&payload).ok_or_else(|| anyhow!("Prompt model returned no content"))?;
        info!("Generated prompt: {prompt}");
        Ok(prompt)
    }
}

fn build_body(model: &str, seeds: &[String]) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": seeds.join(" ") }
        ]
    })
}

fn extract_prompt(payload: &Value) -> Option<String> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
