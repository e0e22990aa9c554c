//! Generator adapters: one uniform capability over several backends.
//!
//! The pipeline only ever sees [`Generator`]; which wire protocol sits
//! behind it is a constructor choice.

mod gemini;
mod openai;
pub mod prompts;
mod traits;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;
pub use traits::{truncate_to_budget, ChatMessage, Generator, Role};

use std::sync::Arc;

use crate::config::{GeneratorBackend, GeneratorConfig};
use crate::error::Result;

/// Build the configured generator backend. Local inference servers are
/// health-checked here so a dead deployment fails at startup.
pub async fn build_generator(config: &GeneratorConfig) -> Result<Arc<dyn Generator>> {
    match config.backend {
        GeneratorBackend::OpenAi | GeneratorBackend::OpenRouter => {
            Ok(Arc::new(OpenAiGenerator::from_config(config)?))
        }
        GeneratorBackend::Vllm => {
            let generator = OpenAiGenerator::from_config(config)?;
            generator.health_check().await?;
            Ok(Arc::new(generator))
        }
        GeneratorBackend::Gemini => Ok(Arc::new(GeminiGenerator::from_config(config)?)),
    }
}
