pub mod openai;
pub mod retry;

use moot_core::config::AppConfig;
use moot_core::traits::Generator;

pub use openai::OpenAiGenerator;
pub use retry::{with_backoff, RetryPolicy, RetryingGenerator};

/// Create the generation backend described by the config, wrapped in the
/// rate-limit retry policy.
///
/// Every provider is reached through the OpenAI-compatible chat completions
/// API (OpenAI, Ollama, vLLM, Groq, OpenRouter, ...).
pub fn create_generator(config: &AppConfig) -> Box<dyn Generator> {
    let inner = OpenAiGenerator::new(config.model.clone(), config.structured_model().clone());
    Box::new(RetryingGenerator::new(
        Box::new(inner),
        RetryPolicy::from(&config.retry),
    ))
}
