use std::time::Duration;
use log::{error, info, warn};
use reqwest::blocking::Client;
use dtv_core::compose::{combine_logo, combined_path};
use dtv_core::{ArtPusher, BoxedProvider, Fetcher, GenerationRequest, Pipeline, ProviderChain, RequestError};
use dtv_gen::{HuggingFaceProvider, IdeogramProvider, OpenAiProvider, PromptGenerator};
use crate::config::{AppConfig, ProviderKind};
use crate::device::SamsungConnector;
use crate::error::AppError;

const GENERATION_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub fn http_client() -> anyhow::Result<Client> {
    Ok(Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(GENERATION_TIMEOUT)
        .build()?)
}

/// Providers in `PROVIDERS` order.
pub fn build_chain(config: &AppConfig, client: &Client) -> ProviderChain {
    let mut chain = ProviderChain::default();
    for kind in &config.providers {
        let provider: BoxedProvider = match kind {
            ProviderKind::HuggingFace => Box::new(HuggingFaceProvider::new(client.clone(), config.huggingface.clone())),
            ProviderKind::OpenAi => match &config.openai {
                Some(openai) => Box::new(OpenAiProvider::new(client.clone(), openai.clone())),
                None => continue,
            },
            ProviderKind::Ideogram => match &config.ideogram {
                Some(ideogram) => Box::new(IdeogramProvider::new(client.clone(), ideogram.clone())),
                None => continue,
            },
        };
        chain.push(provider);
    }
    chain
}

pub fn build_pusher(config: &AppConfig) -> ArtPusher<SamsungConnector> {
    ArtPusher::new(SamsungConnector::new(&config.tv)).with_settle_delay(config.tv.settle_delay)
}

pub fn build_pipeline(config: &AppConfig, client: &Client) -> Pipeline<SamsungConnector> {
    Pipeline::new(
        build_chain(config, client),
        Fetcher::new(client.clone()),
        build_pusher(config),
    )
}

pub fn prompt_generator(config: &AppConfig, client: &Client) -> Option<PromptGenerator> {
    config
        .prompt_model
        .clone()
        .map(|prompt_config| PromptGenerator::new(client.clone(), prompt_config))
}

/// `PROMPT`, else a generated prompt, else the built-in default.
pub fn resolve_prompt(config: &AppConfig, generator: Option<&PromptGenerator>) -> String {
    if let Some(prompt) = &config.generation.prompt {
        return prompt.clone();
    }
    if let Some(generator) = generator {
        match generator.generate() {
            Ok(prompt) => {
                info!("Generated prompt: {prompt}");
                return prompt;
            }
            Err(e) => warn!("Prompt generation failed, using default prompt: {e:#}"),
        }
    }
    AppConfig::default_prompt().to_string()
}

pub fn build_request(config: &AppConfig, prompt: impl Into<String>) -> Result<GenerationRequest, RequestError> {
    let generation = &config.generation;
    Ok(GenerationRequest::new(prompt, generation.width, generation.height)?
        .with_negative_prompt(generation.negative_prompt.clone())
        .with_params(generation.params.clone()))
}

/// Generate, fetch and push a single image.
pub fn run_once(config: &AppConfig) -> anyhow::Result<()> {
    let address = config.tv.ip.clone().ok_or(AppError::Missing("TV_IP"))?;
    let client = http_client()?;
    let pipeline = build_pipeline(config, &client);
    if pipeline.chain().is_empty() {
        return Err(AppError::Config("PROVIDERS does not name any provider".into()).into());
    }

    let prompt = resolve_prompt(config, prompt_generator(config, &client).as_ref());
    let request = build_request(config, prompt)?;

    let span = tracing::info_span!("run", tv = %address, providers = ?pipeline.chain().provider_ids());
    let _enter = span.enter();

    match pipeline.run(&request, &config.images_folder, &address, &config.tv.style) {
        Ok(run) => {
            info!(
                "Displayed {} as {} (selected: {})",
                run.stored.path.display(),
                run.outcome.content_id,
                run.outcome.selected
            );
            if let Some(reason) = &run.outcome.selection_error {
                warn!("Upload succeeded but selection was not confirmed: {reason}");
            }
            Ok(())
        }
        Err(e) => {
            error!("{} stage failed: {e}", e.stage().as_str());
            Err(e.into())
        }
    }
}

/// Generate and store a background, place the logo on it, and push the
/// combined image when a TV is configured.
pub fn run_logo(config: &AppConfig) -> anyhow::Result<()> {
    let logo = config.logo_path.clone().ok_or(AppError::Missing("LOGO_PATH"))?;
    let client = http_client()?;
    let pipeline = build_pipeline(config, &client);
    if pipeline.chain().is_empty() {
        return Err(AppError::Config("PROVIDERS does not name any provider".into()).into());
    }

    let prompt = resolve_prompt(config, prompt_generator(config, &client).as_ref());
    let request = build_request(config, prompt)?;

    let span = tracing::info_span!("logo", logo = %logo.display());
    let _enter = span.enter();

    let (_, stored) = pipeline
        .generate_and_fetch(&request, &config.images_folder)
        .inspect_err(|e| error!("{} stage failed: {e}", e.stage().as_str()))?;

    let combined = combined_path(&stored.path);
    combine_logo(&logo, &stored.path, &combined).inspect_err(|e| error!("compose stage failed: {e}"))?;
    info!("Saved combined image {}", combined.display());

    if let Some(address) = &config.tv.ip {
        let outcome = build_pusher(config)
            .push(&combined, address, &config.tv.style)
            .inspect_err(|e| error!("push stage failed: {e}"))?;
        info!("Displayed {} as {} (selected: {})", combined.display(), outcome.content_id, outcome.selected);
    }
    Ok(())
}
