//! OpenAI-compatible model provider.
//!
//! One [`OpenAiCompatProvider`] talks to any `/chat/completions` endpoint that
//! speaks the OpenAI function-calling dialect: OpenAI itself, Ollama, vLLM,
//! LM Studio. Capability schemas go out as function tools; tool calls come
//! back as [`ModelReply::ToolCalls`].
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

pub mod types;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use pulse_core::llm::provider::ModelProvider;
use pulse_types::config::ModelConfig;
use pulse_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, Message, MessageRole, ModelReply, ToolCall,
    Usage,
};

use self::types::{
    ChatMessage, ChatRequest, ChatResponse, ErrorEnvelope, FunctionCall, FunctionDefinition,
    ToolDefinition, WireToolCall,
};

/// Model provider for OpenAI-compatible chat completion APIs.
///
/// Does NOT derive Debug so the API key cannot leak through formatting.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl OpenAiCompatProvider {
    /// Create a provider for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// `api_key` may be `None` for local servers that do not authenticate.
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build from config, reading the key from the env var it names.
    pub fn from_config(config: &ModelConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        Self::new(config.base_url.clone(), api_key)
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Convert a generic [`CompletionRequest`] into the wire request.
pub fn to_wire_request(request: &CompletionRequest) -> ChatRequest {
    ChatRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(to_wire_message).collect(),
        tools: request
            .tools
            .iter()
            .map(|tool| ToolDefinition {
                kind: "function",
                function: FunctionDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect(),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    }
}

fn to_wire_message(message: &Message) -> ChatMessage {
    let tool_calls = (!message.tool_calls.is_empty()).then(|| {
        message
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            })
            .collect()
    });

    // Assistant messages that only request tools send `content: null`.
    let content = if message.role == MessageRole::Assistant
        && tool_calls.is_some()
        && message.content.is_empty()
    {
        None
    } else {
        Some(message.content.clone())
    };

    ChatMessage {
        role: message.role.to_string(),
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

/// Interpret the first choice of a wire response as a [`ModelReply`].
pub fn parse_reply(response: ChatResponse) -> Result<CompletionResponse, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Deserialization("response has no choices".to_string()))?;

    let text = choice.message.content.filter(|t| !t.trim().is_empty());
    let calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: parse_arguments(&call.function.arguments),
        })
        .collect();

    let reply = if calls.is_empty() {
        ModelReply::Final {
            text: text.unwrap_or_default(),
        }
    } else {
        ModelReply::ToolCalls { text, calls }
    };

    let usage = response
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        "Model reply parsed"
    );

    Ok(CompletionResponse {
        id: response.id,
        model: response.model,
        reply,
        usage,
    })
}

/// Arguments arrive as a JSON string. Empty means no arguments; anything
/// unparseable is passed through as a string so capability decoding reports it.
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Map a non-success HTTP status and body to an [`LlmError`].
pub fn map_status(status: u16, body: &str, retry_after: Option<&str>) -> LlmError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited {
            retry_after_ms: retry_after
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|secs| (secs * 1000.0) as u64),
        },
        400 | 404 | 422 => LlmError::InvalidRequest(message),
        503 | 529 => LlmError::Overloaded(message),
        500..=599 => LlmError::Server { status, message },
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

fn map_transport(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(300)
    } else {
        LlmError::Transport(e.to_string())
    }
}

impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = to_wire_request(request);

        let mut http = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key.expose_secret());
        }

        let response = http.send().await.map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), &error_body, retry_after.as_deref()));
        }

        let wire: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;
        parse_reply(wire)
    }
}
