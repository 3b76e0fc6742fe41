//! ModelProvider trait definition.
//!
//! The model capability as the orchestrator sees it: messages and capability
//! schemas in, either a final answer or requested capability calls out.

use pulse_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for model backends (OpenAI-compatible endpoints, local servers, test doubles).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in pulse-infra (e.g., `OpenAiCompatProvider`).
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai_compat").
    fn name(&self) -> &str;

    /// Send a completion request and receive the model's reply.
    ///
    /// Implementations do not retry; see [`super::retry::complete_with_retry`].
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
