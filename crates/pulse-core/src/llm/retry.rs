//! Timeout + single-retry wrapper around the model capability.

use std::time::Duration;

use tracing::{Instrument, debug, info_span, warn};

use pulse_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::box_provider::BoxModelProvider;

/// Call the model with a per-attempt timeout, retrying once on transient failure.
///
/// Non-transient errors (bad credentials, invalid request) are returned
/// immediately. The caller maps whatever comes back to `ModelUnavailable`.
pub async fn complete_with_retry(
    provider: &BoxModelProvider,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<CompletionResponse, LlmError> {
    let mut last_error = None;

    for attempt in 0..2u8 {
        let span = info_span!(
            "gen_ai.complete",
            gen_ai.system = provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.tools = request.tools.len(),
            attempt,
        );

        let outcome = tokio::time::timeout(timeout, provider.complete(request))
            .instrument(span)
            .await;

        let err = match outcome {
            Ok(Ok(response)) => {
                debug!(
                    attempt,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Model call completed"
                );
                return Ok(response);
            }
            Ok(Err(e)) => e,
            Err(_) => LlmError::Timeout(timeout.as_secs()),
        };

        if !err.is_transient() {
            warn!(attempt, error = %err, "Model call failed (not retryable)");
            return Err(err);
        }

        warn!(attempt, error = %err, "Model call failed");
        last_error = Some(err);
    }

    Err(last_error.unwrap_or(LlmError::Provider {
        message: "model call failed".to_string(),
    }))
}
