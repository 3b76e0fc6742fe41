//! Turn-level types for the Pulse orchestrator.
//!
//! A turn takes one user message through the orchestrator state machine and
//! yields a `TurnResponse` whose metadata records what happened along the way:
//! the state trace, capability invocations, trimming stats, and whether the
//! iteration bound truncated the answer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// States of the orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Routing,
    AssemblingContext,
    ModelTurn,
    ToolExec,
    Reflecting,
    WriteBack,
    Done,
    Failed,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done | TurnState::Failed)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Routing => "routing",
            TurnState::AssemblingContext => "assembling_context",
            TurnState::ModelTurn => "model_turn",
            TurnState::ToolExec => "tool_exec",
            TurnState::Reflecting => "reflecting",
            TurnState::WriteBack => "write_back",
            TurnState::Done => "done",
            TurnState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One capability call executed during a turn.
///
/// Exactly one of `result` / `error` is set once the call has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolInvocation {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Payload handed back to the model as the tool-result message.
    pub fn result_payload(&self) -> serde_json::Value {
        match (&self.result, &self.error) {
            (_, Some(err)) => serde_json::json!({ "error": err }),
            (Some(value), None) => value.clone(),
            (None, None) => serde_json::Value::Null,
        }
    }
}

/// How tokens were counted for a message sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMethod {
    /// The pluggable precise counter.
    Tokenizer,
    /// Coarse characters/4 fallback.
    CharEstimate,
}

/// Outcome of a trim pass over a message sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimStats {
    pub messages_before: usize,
    pub messages_after: usize,
    pub tokens_before: u32,
    pub tokens_after: u32,
    pub trimmed: bool,
    /// The `min_keep` floor stopped trimming while still over budget.
    pub floor_hit: bool,
    pub method: CountMethod,
}

/// How a turn ended from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The model produced a final answer.
    Completed,
    /// The intent router answered without the model.
    Routed,
    /// The iteration bound forced termination; `text` is the best partial answer.
    IterationLimitExceeded,
}

/// Everything observable about a finished turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// Number of model calls made.
    pub iterations: u32,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routed_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<TrimStats>,
    pub states: Vec<TurnState>,
}

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub text: String,
    pub status: TurnStatus,
    pub metadata: TurnMetadata,
}

/// Stable, user-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ModelUnavailable,
    EmbeddingUnavailable,
    StoreUnavailable,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ModelUnavailable => "model_unavailable",
            ErrorCode::EmbeddingUnavailable => "embedding_unavailable",
            ErrorCode::StoreUnavailable => "store_unavailable",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Internal => "internal",
        };
        write!(f, "{s}")
    }
}
