//! Language-model providers used for classification and answer generation.

use async_trait::async_trait;

use crate::error::GenerationError;

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Trait implemented by concrete LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Runs one completion and returns the raw reply text.
    async fn complete(&self, request: &ProviderRequest<'_>) -> Result<String, GenerationError>;
}

/// Request envelope shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// System instruction framing the task.
    pub system: &'a str,
    /// User turn.
    pub prompt: &'a str,
    /// Sampling temperature; 0 for deterministic decoding.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: usize,
}
