use log::{info, warn};
use crate::error::{AllProvidersFailed, ProviderError};
use crate::request::{GenerationRequest, GenerationResult};

/// An image generation backend.
pub trait ImageProvider {
    /// Stable identifier used in results and error reports.
    fn id(&self) -> &str;

    /// Runs one generation attempt. Failures are attributed to [`Self::id`] by the chain.
    fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GenerationResult>;
}

pub type BoxedProvider = Box<dyn ImageProvider + Send + Sync>;

/// Ordered fallback over several providers.
///
/// Providers are tried once each, in insertion order, until one succeeds.
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<BoxedProvider>,
}

impl ProviderChain {
    pub fn new(providers: Vec<BoxedProvider>) -> Self {
        Self { providers }
    }

    pub fn push(&mut self, provider: BoxedProvider) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AllProvidersFailed> {
        let mut errors = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            info!("Generating image with provider `{}`", provider.id());
            match provider.generate(request) {
                Ok(result) => {
                    info!(
                        "Provider `{}` produced {:?} at {}",
                        provider.id(),
                        result.source_kind,
                        result.location
                    );
                    return Ok(result);
                }
                Err(cause) => {
                    warn!("Provider `{}` failed: {:#}", provider.id(), cause);
                    errors.push(ProviderError::new(provider.id(), cause));
                }
            }
        }

        Err(AllProvidersFailed { errors })
    }
}
