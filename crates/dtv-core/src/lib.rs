pub mod art;
pub mod compose;
pub mod error;
pub mod fetch;
pub mod gallery;
pub mod pipeline;
pub mod provider;
mod request;

pub use art::{ArtConnector, ArtDevice, ArtDisplaySession, ArtPusher, DisplayStyle, FileType, SessionState, UploadOutcome};
pub use error::{
    AllProvidersFailed, ComposeError, DeviceError, FetchError, PipelineError, ProviderError, PushError, RequestError,
    SelectionError, Stage,
};
pub use fetch::Fetcher;
pub use pipeline::{Pipeline, PipelineRun, TempArtifact};
pub use provider::{BoxedProvider, ImageProvider, ProviderChain};
pub use request::{
    extension_for_mime, image_file_name, known_extension, GenerationRequest, GenerationResult, Orientation,
    SourceKind, StoredImage, DEFAULT_EXTENSION, IMAGE_EXTENSIONS,
};
