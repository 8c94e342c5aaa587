use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single provider attempt that did not produce an image.
///
/// Recoverable: the chain moves on to the next provider.
#[derive(Error, Debug)]
#[error("provider `{provider_id}` failed: {cause:#}")]
pub struct ProviderError {
    pub provider_id: String,
    pub cause: anyhow::Error,
}

impl ProviderError {
    pub fn new(provider_id: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            provider_id: provider_id.into(),
            cause,
        }
    }
}

/// Every provider in the chain failed. Errors are kept in call order.
#[derive(Error, Debug)]
pub struct AllProvidersFailed {
    pub errors: Vec<ProviderError>,
}

impl fmt::Display for AllProvidersFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "no image providers are configured");
        }
        write!(f, "all {} image providers failed", self.errors.len())?;
        for err in &self.errors {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("image dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to download image from {url}: {reason}")]
    Download { url: String, reason: String },
    #[error("source image {} is unusable: {reason}", path.display())]
    MissingSource { path: PathBuf, reason: String },
    #[error("failed to write image into {}: {source}", folder.display())]
    Io {
        folder: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error taxonomy of the display device SDK.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("device did not answer in time: {0}")]
    Timeout(String),
    #[error("device request failed: {0}")]
    Failure(String),
}

/// Raised by the device when it refuses to show uploaded content.
///
/// Never escapes a push; it is folded into [`crate::UploadOutcome`].
#[derive(Error, Debug)]
#[error("selecting content `{content_id}` failed: {cause}")]
pub struct SelectionError {
    pub content_id: String,
    #[source]
    pub cause: DeviceError,
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("could not connect to {address}: {reason}")]
    Connection { address: String, reason: String },
    #[error("timed out talking to {address}: {reason}")]
    Timeout { address: String, reason: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("upload failed: {cause}")]
    Upload {
        #[source]
        cause: DeviceError,
    },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session is {actual:?}, operation requires {expected:?}")]
    InvalidState {
        expected: crate::SessionState,
        actual: crate::SessionState,
    },
}

/// Pipeline stage a run failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Fetch,
    Push,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Fetch => "fetch",
            Stage::Push => "push",
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("generate stage failed: {0}")]
    Generate(#[from] AllProvidersFailed),
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("push stage failed: {0}")]
    Push(#[from] PushError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Generate(_) => Stage::Generate,
            PipelineError::Fetch(_) => Stage::Fetch,
            PipelineError::Push(_) => Stage::Push,
        }
    }
}

/// Placing a logo on a stored background failed.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("logo must be a PNG file: {}", path.display())]
    LogoNotPng { path: PathBuf },
    #[error("logo would be resized to {width}x{height}")]
    EmptyLogo { width: u32, height: u32 },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
