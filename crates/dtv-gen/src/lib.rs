//! Image generation backends and the prompt generator.

mod http;
pub mod huggingface;
pub mod ideogram;
pub mod openai;
pub mod prompt;

pub use huggingface::{HuggingFaceConfig, HuggingFaceProvider};
pub use ideogram::{IdeogramConfig, IdeogramProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use prompt::{PromptConfig, PromptGenerator};
