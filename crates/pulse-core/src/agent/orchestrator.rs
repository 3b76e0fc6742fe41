//! The turn state machine.
//!
//! ```text
//! Routing -> AssemblingContext -> ModelTurn -> (ToolExec -> ModelTurn)*
//!         -> Reflecting -> WriteBack -> Done
//! ```
//!
//! `Failed` is reachable from any state. A routed message goes straight from
//! `Routing` to `Done`. The iteration bound counts model calls: once it is
//! spent, the next `ModelTurn` ends the turn with the best text seen so far
//! and flags the response as truncated. Every message the turn produces is
//! appended to the Short-Term Store as soon as it exists, so a failed turn
//! still leaves its partial transcript behind.

use std::collections::HashSet;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pulse_types::agent::{ErrorCode, ToolInvocation, TurnMetadata, TurnResponse, TurnState, TurnStatus};
use pulse_types::chat::ChatMessage;
use pulse_types::config::AssistantVariant;
use pulse_types::error::{MemoryError, RepositoryError};
use pulse_types::llm::{CompletionRequest, LlmError, Message, MessageRole, ModelReply, ToolCall};

use crate::chat::short_term::ShortTermStore;
use crate::llm::retry::complete_with_retry;
use crate::memory::cache::EmbeddingCacheStore;
use crate::memory::vector::VectorIndex;
use crate::router;

use super::capability::CapabilityTable;
use super::context::AssistantContext;
use super::executor::CapabilityExecutor;
use super::outcome::WorkflowOutcome;
use super::prompt::system_prompt;
use super::writeback::{write_back_episodic, write_back_procedural};

/// Answer used when the iteration bound is hit before the model said anything.
pub const INSUFFICIENT_INFORMATION: &str =
    "I couldn't gather enough information to answer that fully. Could you narrow the question down?";

const APOLOGY: &str = "Sorry, something went wrong while handling your message. Please try again.";

/// One user message to run through the state machine.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub user_id: String,
    pub message: String,
    pub cancellation: CancellationToken,
}

impl TurnRequest {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            message: message.into(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// Unrecoverable turn errors.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[source] LlmError),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl TurnError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TurnError::ModelUnavailable(_) => ErrorCode::ModelUnavailable,
            TurnError::EmbeddingUnavailable(_) => ErrorCode::EmbeddingUnavailable,
            TurnError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            TurnError::Cancelled => ErrorCode::Cancelled,
            TurnError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<RepositoryError> for TurnError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => TurnError::Internal(msg),
            other => TurnError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<MemoryError> for TurnError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::EmbeddingUnavailable(msg) => TurnError::EmbeddingUnavailable(msg),
            MemoryError::Store(e) => e.into(),
            other => TurnError::Internal(other.to_string()),
        }
    }
}

/// A turn that ended in `Failed`, with what was produced before the failure.
#[derive(Debug, thiserror::Error)]
#[error("turn failed ({code}): {error}")]
pub struct TurnFailure {
    #[source]
    pub error: TurnError,
    pub code: ErrorCode,
    /// Generic apology to show the user.
    pub message: String,
    /// Messages of this turn that made it into the Short-Term Store.
    pub transcript: Vec<ChatMessage>,
    pub metadata: TurnMetadata,
}

/// Run one turn to completion.
#[tracing::instrument(
    name = "turn",
    skip_all,
    fields(session_id = %request.session_id, user_id = %request.user_id, variant = %ctx.variant())
)]
pub async fn run_turn<S, V, C>(
    ctx: &AssistantContext<S, V, C>,
    request: TurnRequest,
) -> Result<TurnResponse, TurnFailure>
where
    S: ShortTermStore,
    V: VectorIndex,
    C: EmbeddingCacheStore,
{
    let mut turn = Turn::new(ctx, request);
    let mut state = TurnState::Routing;

    loop {
        turn.metadata.states.push(state);
        debug!(%state, "Turn state");

        let next = match state {
            TurnState::Routing => turn.route().await,
            TurnState::AssemblingContext => turn.assemble_context().await,
            TurnState::ModelTurn => turn.model_turn().await,
            TurnState::ToolExec => turn.tool_exec().await,
            TurnState::Reflecting => Ok(turn.reflect()),
            TurnState::WriteBack => Ok(turn.write_back().await),
            TurnState::Done => return Ok(turn.into_response()),
            TurnState::Failed => {
                return Err(turn.into_failure(TurnError::Internal("turn failed".to_string())));
            }
        };

        state = match next {
            Ok(next) => next,
            Err(error) => {
                turn.metadata.states.push(TurnState::Failed);
                warn!(error = %error, code = %error.code(), "Turn failed");
                return Err(turn.into_failure(error));
            }
        };
    }
}

/// Mutable state of one in-flight turn.
struct Turn<'a, S, V, C> {
    ctx: &'a AssistantContext<S, V, C>,
    request: TurnRequest,
    table: CapabilityTable,
    messages: Vec<Message>,
    pending: Vec<ToolCall>,
    transcript: Vec<ChatMessage>,
    metadata: TurnMetadata,
    model_calls: u32,
    last_text: Option<String>,
    final_text: Option<String>,
    status: TurnStatus,
    outcome: Option<WorkflowOutcome>,
}

impl<'a, S, V, C> Turn<'a, S, V, C>
where
    S: ShortTermStore,
    V: VectorIndex,
    C: EmbeddingCacheStore,
{
    fn new(ctx: &'a AssistantContext<S, V, C>, request: TurnRequest) -> Self {
        Self {
            table: CapabilityTable::for_variant(ctx.variant()),
            ctx,
            request,
            messages: Vec::new(),
            pending: Vec::new(),
            transcript: Vec::new(),
            metadata: TurnMetadata::default(),
            model_calls: 0,
            last_text: None,
            final_text: None,
            status: TurnStatus::Completed,
            outcome: None,
        }
    }

    fn memory_enabled(&self) -> bool {
        self.ctx.variant() == AssistantVariant::Memory
    }

    /// Persist a message of this turn to the Short-Term Store.
    async fn record(&mut self, message: &Message) -> Result<(), TurnError> {
        let stored = ChatMessage::from_message(&self.request.session_id, message);
        self.ctx.short_term.append(&stored).await?;
        self.transcript.push(stored);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), TurnError> {
        if self.request.cancellation.is_cancelled() {
            info!("Turn cancelled");
            return Err(TurnError::Cancelled);
        }
        Ok(())
    }

    async fn route(&mut self) -> Result<TurnState, TurnError> {
        self.ctx
            .short_term
            .ensure_session(&self.request.session_id, &self.request.user_id)
            .await?;

        if !self.memory_enabled() {
            return Ok(TurnState::AssemblingContext);
        }

        let routed = router::route(&self.ctx.episodic, &self.request.user_id, &self.request.message).await?;
        let Some(action) = routed else {
            return Ok(TurnState::AssemblingContext);
        };

        let user = Message::user(self.request.message.clone());
        self.record(&user).await?;
        self.record(&Message::assistant(action.response.clone())).await?;

        self.metadata.routed_intent = Some(action.intent.name().to_string());
        self.final_text = Some(action.response);
        self.status = TurnStatus::Routed;
        Ok(TurnState::Done)
    }

    async fn assemble_context(&mut self) -> Result<TurnState, TurnError> {
        let memory = &self.ctx.config.memory;
        let history = self
            .ctx
            .short_term
            .read(&self.request.session_id, memory.history_limit)
            .await?;

        let user = Message::user(self.request.message.clone());
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt(
            self.ctx.variant(),
            Utc::now().date_naive(),
        )));
        messages.extend(drop_orphaned_results(
            history.into_iter().map(ChatMessage::into_message).collect(),
        ));
        messages.push(user.clone());
        self.record(&user).await?;

        self.messages = messages;
        self.trim();
        Ok(TurnState::ModelTurn)
    }

    /// Trim the working context to the token budget, keeping the first stats seen.
    fn trim(&mut self) {
        let memory = &self.ctx.config.memory;
        let (trimmed, stats) = self.ctx.accountant.trim(
            std::mem::take(&mut self.messages),
            memory.token_budget,
            memory.min_messages_kept,
        );
        self.messages = trimmed;

        match &mut self.metadata.trim {
            Some(existing) => {
                existing.messages_after = stats.messages_after;
                existing.tokens_after = stats.tokens_after;
                existing.trimmed |= stats.trimmed;
                existing.floor_hit |= stats.floor_hit;
            }
            None => self.metadata.trim = Some(stats),
        }
    }

    async fn model_turn(&mut self) -> Result<TurnState, TurnError> {
        self.check_cancelled()?;

        let limit = self.ctx.iteration_limit();
        if self.model_calls >= limit {
            warn!(limit, "Iteration limit reached; ending turn with best partial answer");
            let text = self
                .last_text
                .clone()
                .unwrap_or_else(|| INSUFFICIENT_INFORMATION.to_string());
            self.record(&Message::assistant(text.clone())).await?;
            self.metadata.truncated = true;
            self.status = TurnStatus::IterationLimitExceeded;
            self.final_text = Some(text);
            return Ok(TurnState::Reflecting);
        }

        if self.model_calls > 0 {
            self.trim();
        }

        let agent = &self.ctx.config.agent;
        let request = CompletionRequest {
            model: self.ctx.config.model.model.clone(),
            messages: self.messages.clone(),
            tools: self.table.schemas(),
            max_tokens: agent.max_tokens,
            temperature: Some(agent.temperature),
        };

        self.model_calls += 1;
        self.metadata.iterations = self.model_calls;
        let response = complete_with_retry(&self.ctx.model, &request, self.ctx.model_timeout())
            .await
            .map_err(TurnError::ModelUnavailable)?;

        if let Some(text) = response.reply.text() {
            self.last_text = Some(text.to_string());
        }

        match response.reply {
            ModelReply::ToolCalls { text, calls } if !calls.is_empty() => {
                let calls: Vec<ToolCall> = calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, mut call)| {
                        if call.id.trim().is_empty() {
                            call.id = format!("call_{}_{i}", self.model_calls);
                        }
                        call
                    })
                    .collect();
                debug!(
                    iteration = self.model_calls,
                    calls = calls.len(),
                    "Model requested capabilities"
                );

                let message = Message::assistant_with_calls(text.unwrap_or_default(), calls.clone());
                self.record(&message).await?;
                self.messages.push(message);
                self.pending = calls;
                Ok(TurnState::ToolExec)
            }
            reply => {
                let text = reply
                    .text()
                    .map(str::to_string)
                    .unwrap_or_else(|| INSUFFICIENT_INFORMATION.to_string());
                let message = Message::assistant(text.clone());
                self.record(&message).await?;
                self.messages.push(message);
                self.final_text = Some(text);
                Ok(TurnState::Reflecting)
            }
        }
    }

    async fn tool_exec(&mut self) -> Result<TurnState, TurnError> {
        self.check_cancelled()?;

        let calls = std::mem::take(&mut self.pending);
        let executor = CapabilityExecutor::new(
            self.ctx,
            &self.table,
            &self.request.session_id,
            &self.request.user_id,
        );
        let invocations: Vec<ToolInvocation> = executor.execute_batch(&calls).await;

        for invocation in invocations {
            let message = Message::tool_result(
                invocation.call_id.clone(),
                invocation.result_payload().to_string(),
            );
            self.record(&message).await?;
            self.messages.push(message);
            self.metadata.invocations.push(invocation);
        }
        Ok(TurnState::ModelTurn)
    }

    fn reflect(&mut self) -> TurnState {
        let outcome = WorkflowOutcome::compute(
            &self.metadata.invocations,
            self.final_text.as_deref(),
            self.metadata.truncated,
        );
        debug!(
            score = outcome.score,
            calls = outcome.calls,
            failed = outcome.failed,
            "Workflow outcome"
        );
        self.metadata.outcome_score = Some(outcome.score);
        self.outcome = Some(outcome);
        TurnState::WriteBack
    }

    /// Best-effort: failures are logged and never change the answer.
    async fn write_back(&mut self) -> TurnState {
        if !self.memory_enabled() || self.request.cancellation.is_cancelled() {
            return TurnState::Done;
        }
        let reply = self.final_text.as_deref().unwrap_or_default();

        write_back_episodic(
            &self.ctx.episodic,
            &self.ctx.extractor,
            &self.request.user_id,
            &self.request.message,
            reply,
        )
        .await;

        if let Some(outcome) = &self.outcome {
            let threshold = self.ctx.config.memory.procedural_success_threshold;
            if let Err(e) = write_back_procedural(
                &self.ctx.procedural,
                &self.request.message,
                &self.metadata.invocations,
                outcome,
                threshold,
            )
            .await
            {
                warn!(error = %e, "Procedural write-back failed");
            }
        }
        TurnState::Done
    }

    fn into_response(self) -> TurnResponse {
        info!(
            status = ?self.status,
            iterations = self.metadata.iterations,
            invocations = self.metadata.invocations.len(),
            truncated = self.metadata.truncated,
            "Turn complete"
        );
        TurnResponse {
            text: self
                .final_text
                .unwrap_or_else(|| INSUFFICIENT_INFORMATION.to_string()),
            status: self.status,
            metadata: self.metadata,
        }
    }

    fn into_failure(self, error: TurnError) -> TurnFailure {
        TurnFailure {
            code: error.code(),
            error,
            message: APOLOGY.to_string(),
            transcript: self.transcript,
            metadata: self.metadata,
        }
    }
}

/// Drop capability results whose call fell outside the history window, and
/// calls whose results did.
///
/// Chat backends reject a tool result that answers no visible call.
fn drop_orphaned_results(history: Vec<Message>) -> Vec<Message> {
    let answered: HashSet<&str> = history
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    let issued: HashSet<String> = history
        .iter()
        .filter(|m| {
            !m.tool_calls.is_empty()
                && m.tool_calls.iter().all(|c| answered.contains(c.id.as_str()))
        })
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.clone()))
        .collect();

    let before = history.len();
    let kept: Vec<Message> = history
        .into_iter()
        .filter(|m| match (&m.role, &m.tool_call_id) {
            (MessageRole::Tool, Some(id)) => issued.contains(id),
            (MessageRole::Tool, None) => false,
            _ => m.tool_calls.iter().all(|c| issued.contains(&c.id)),
        })
        .collect();
    if kept.len() < before {
        debug!(dropped = before - kept.len(), "Dropped orphaned capability messages from history");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pulse_types::memory::{MemoryKind, OwnerScope};
    use serde_json::json;

    use crate::testing::{
        PanickingModel, ScriptedModel, StaticHealthSource, test_context, tool_call,
    };

    fn heart_rate_call() -> ModelReply {
        ModelReply::ToolCalls {
            text: None,
            calls: vec![tool_call(
                "get_health_metrics",
                json!({"metric": "heart_rate", "start_date": "2026-03-02", "end_date": "2026-03-08", "aggregation": "average"}),
            )],
        }
    }

    #[tokio::test]
    async fn test_scenario_goal_is_routed_without_model() {
        let ctx = test_context(PanickingModel, StaticHealthSource::heart_rate(72));
        let response = run_turn(
            &ctx,
            TurnRequest::new("s1", "alice", "My goal is to run 3 times per week"),
        )
        .await
        .unwrap();

        assert_eq!(response.status, TurnStatus::Routed);
        assert_eq!(response.metadata.iterations, 0);
        assert_eq!(response.metadata.routed_intent.as_deref(), Some("set_goal"));
        assert_eq!(
            response.metadata.states,
            vec![TurnState::Routing, TurnState::Done]
        );

        let goals = ctx.episodic.latest_goals("alice").await.unwrap();
        assert_eq!(goals.len(), 1);
        assert!(goals[0].description.contains("run 3 times per week"));

        let log = ctx.short_term.read("s1", 10).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_router_handles_list_and_delete_without_model() {
        let ctx = test_context(PanickingModel, StaticHealthSource::heart_rate(72));
        for message in [
            "My goal is to sleep 8 hours a night",
            "What are my goals?",
            "Delete my goals",
        ] {
            let response = run_turn(&ctx, TurnRequest::new("s1", "u", message)).await.unwrap();
            assert_eq!(response.status, TurnStatus::Routed);
        }
        assert!(ctx.episodic.latest_goals("u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_heart_rate_answer_uses_capability_result() {
        let model = ScriptedModel::new(vec![
            Ok(heart_rate_call()),
            Ok(ModelReply::Final {
                text: "Your average heart rate last week was 72 bpm.".into(),
            }),
        ]);
        let ctx = test_context(model.clone(), StaticHealthSource::heart_rate(72));

        let response = run_turn(
            &ctx,
            TurnRequest::new("s1", "alice", "What was my average heart rate last week?"),
        )
        .await
        .unwrap();

        assert_eq!(response.status, TurnStatus::Completed);
        assert!(response.text.contains("72"));
        assert_eq!(response.metadata.iterations, 2);
        assert_eq!(response.metadata.invocations.len(), 1);
        assert!(!response.metadata.truncated);

        // The second model call saw the capability result.
        let second = &model.requests()[1];
        let tool_message = second
            .messages
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(&tool_message.content).unwrap();
        assert_eq!(payload, json!({"average": 72, "unit": "bpm"}));

        // user, assistant(tool call), tool result, final answer
        assert_eq!(ctx.short_term.read("s1", 50).await.unwrap().len(), 4);
        assert_eq!(
            response.metadata.states,
            vec![
                TurnState::Routing,
                TurnState::AssemblingContext,
                TurnState::ModelTurn,
                TurnState::ToolExec,
                TurnState::ModelTurn,
                TurnState::Reflecting,
                TurnState::WriteBack,
                TurnState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_scenario_iteration_limit_truncates_after_eighth_call() {
        let script: Vec<_> = (0..9).map(|_| Ok(heart_rate_call())).collect();
        let model = ScriptedModel::new(script);
        let mut ctx = test_context(model.clone(), StaticHealthSource::heart_rate(72));
        ctx.config.agent.memory_max_iterations = 8;

        let response = run_turn(&ctx, TurnRequest::new("s1", "u", "Analyse everything about my heart"))
            .await
            .unwrap();

        assert_eq!(response.status, TurnStatus::IterationLimitExceeded);
        assert!(response.metadata.truncated);
        assert_eq!(model.calls(), 8);
        assert_eq!(response.metadata.iterations, 8);
        assert_eq!(response.metadata.invocations.len(), 8);
        assert_eq!(response.text, INSUFFICIENT_INFORMATION);
    }

    #[tokio::test]
    async fn test_iteration_limit_uses_last_model_text() {
        let script = vec![
            Ok(ModelReply::ToolCalls {
                text: Some("So far your average is 72 bpm.".into()),
                calls: vec![tool_call("get_sleep_data", json!({"start_date": "2026-03-01", "end_date": "2026-03-07"}))],
            }),
            Ok(heart_rate_call()),
        ];
        let mut ctx = test_context(ScriptedModel::new(script), StaticHealthSource::heart_rate(72));
        ctx.config.agent.memory_max_iterations = 2;

        let response = run_turn(&ctx, TurnRequest::new("s1", "u", "How am I doing overall"))
            .await
            .unwrap();
        assert!(response.metadata.truncated);
        assert_eq!(response.text, "So far your average is 72 bpm.");
    }

    #[tokio::test]
    async fn test_model_outage_fails_with_partial_transcript() {
        let model = ScriptedModel::new(vec![
            Ok(heart_rate_call()),
            Err(LlmError::Transport("connection refused".into())),
            Err(LlmError::Transport("connection refused".into())),
        ]);
        let ctx = test_context(model, StaticHealthSource::heart_rate(72));

        let failure = run_turn(&ctx, TurnRequest::new("s1", "u", "What was my heart rate?"))
            .await
            .unwrap_err();

        assert_eq!(failure.code, ErrorCode::ModelUnavailable);
        assert_eq!(failure.message, APOLOGY);
        assert_eq!(failure.transcript.len(), 3);
        assert_eq!(ctx.short_term.read("s1", 50).await.unwrap().len(), 3);
        assert_eq!(failure.metadata.states.last(), Some(&TurnState::Failed));
    }

    #[tokio::test]
    async fn test_cancelled_turn_skips_model_and_write_back() {
        let ctx = test_context(PanickingModel, StaticHealthSource::heart_rate(72));
        let request = TurnRequest::new("s1", "u", "I usually sleep 7 hours a night and want to improve it");
        request.cancellation.cancel();

        let failure = run_turn(&ctx, request).await.unwrap_err();
        assert_eq!(failure.code, ErrorCode::Cancelled);
        assert_eq!(ctx.episodic.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_successful_turn_writes_back_episodic_and_procedural() {
        let model = ScriptedModel::new(vec![
            Ok(heart_rate_call()),
            Ok(ModelReply::Final {
                text: "Your average heart rate last week was 72 bpm.".into(),
            }),
        ]);
        let ctx = test_context(model, StaticHealthSource::heart_rate(72));

        run_turn(
            &ctx,
            TurnRequest::new("s1", "alice", "My resting heart rate is usually 58 bpm. What was my average last week?"),
        )
        .await
        .unwrap();

        let facts = ctx
            .episodic
            .list(&OwnerScope::user("alice"), Some(MemoryKind::Fact))
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert!(facts[0].description.contains("58 bpm"));
        assert_eq!(ctx.procedural.count(Some(&OwnerScope::Global)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_turn_without_successful_capability_writes_no_pattern() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls {
                text: None,
                calls: vec![tool_call("get_sleep_data", json!({"start_date": "yesterday"}))],
            }),
            Ok(ModelReply::Final {
                text: "I could not read your sleep data.".into(),
            }),
        ]);
        let ctx = test_context(model, StaticHealthSource::heart_rate(72));

        let response = run_turn(&ctx, TurnRequest::new("s1", "u", "How did I sleep"))
            .await
            .unwrap();
        assert_eq!(response.metadata.invocations.len(), 1);
        assert!(!response.metadata.invocations[0].succeeded());
        let score = response.metadata.outcome_score.unwrap();
        assert!(score < ctx.config.memory.procedural_success_threshold, "score {score}");
        assert_eq!(ctx.procedural.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_history_window_never_starts_with_tool_result() {
        let model = ScriptedModel::new(vec![
            Ok(heart_rate_call()),
            Ok(ModelReply::Final {
                text: "Your average heart rate last week was 72 bpm.".into(),
            }),
            Ok(ModelReply::Final {
                text: "You're welcome!".into(),
            }),
        ]);
        let mut ctx = test_context(model.clone(), StaticHealthSource::heart_rate(72));
        // Turn one logs user, assistant call, tool result, assistant answer.
        ctx.config.memory.history_limit = 2;

        run_turn(&ctx, TurnRequest::new("s1", "u", "What was my average heart rate last week?"))
            .await
            .unwrap();
        let response = run_turn(&ctx, TurnRequest::new("s1", "u", "thanks, that helps a lot"))
            .await
            .unwrap();
        assert_eq!(response.status, TurnStatus::Completed);

        let sent = &model.requests()[2].messages;
        let roles: Vec<_> = sent.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [MessageRole::System, MessageRole::Assistant, MessageRole::User]
        );
    }

    #[test]
    fn test_drop_orphaned_results_keeps_answered_calls() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "get_health_metrics".into(),
            arguments: json!({}),
        };
        let unanswered = ToolCall {
            id: "call_2".into(),
            ..call.clone()
        };
        let history = vec![
            Message::tool_result("call_0", "{}"),
            Message::assistant_with_calls("", vec![call]),
            Message::tool_result("call_1", "{}"),
            Message::assistant("72 bpm."),
            Message::assistant_with_calls("", vec![unanswered]),
        ];

        let kept = drop_orphaned_results(history);
        let ids: Vec<_> = kept
            .iter()
            .map(|m| (m.role, m.tool_call_id.as_deref()))
            .collect();
        assert_eq!(
            ids,
            [
                (MessageRole::Assistant, None),
                (MessageRole::Tool, Some("call_1")),
                (MessageRole::Assistant, None),
            ]
        );
    }

    #[tokio::test]
    async fn test_memoryless_variant_skips_router_and_memory() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::Final {
            text: "I can't store goals, but good luck!".into(),
        })]);
        let mut ctx = test_context(model.clone(), StaticHealthSource::heart_rate(72));
        ctx.config.agent.variant = AssistantVariant::Memoryless;

        let response = run_turn(&ctx, TurnRequest::new("s1", "u", "My goal is to run 3 times per week"))
            .await
            .unwrap();

        assert_eq!(response.status, TurnStatus::Completed);
        assert_eq!(model.calls(), 1);
        let tools: Vec<_> = model.requests()[0].tools.iter().map(|t| t.name.clone()).collect();
        assert_eq!(tools, vec!["get_health_metrics", "get_sleep_data", "get_workouts"]);
        assert_eq!(ctx.episodic.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_history_is_carried_into_next_turn() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::Final { text: "Hello!".into() }),
            Ok(ModelReply::Final { text: "You said hi.".into() }),
        ]);
        let ctx = test_context(model.clone(), StaticHealthSource::heart_rate(72));

        run_turn(&ctx, TurnRequest::new("s1", "u", "hi")).await.unwrap();
        run_turn(&ctx, TurnRequest::new("s1", "u", "what did I just say")).await.unwrap();

        let second = &model.requests()[1];
        assert_eq!(second.messages[0].role, MessageRole::System);
        let contents: Vec<_> = second.messages[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "Hello!", "what did I just say"]);
    }

    #[tokio::test]
    async fn test_long_history_is_trimmed_to_budget() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::Final { text: "ok".into() })]);
        let mut ctx = test_context(model.clone(), StaticHealthSource::heart_rate(72));
        ctx.config.memory.token_budget = 400;
        ctx.config.memory.min_messages_kept = 4;

        ctx.short_term.ensure_session("s1", "u").await.unwrap();
        for i in 0..30 {
            let filler = format!("message {i} {}", "lorem ipsum ".repeat(20));
            ctx.short_term
                .append(&ChatMessage::from_message("s1", &Message::user(filler)))
                .await
                .unwrap();
        }

        let response = run_turn(&ctx, TurnRequest::new("s1", "u", "summarize")).await.unwrap();
        let trim = response.metadata.trim.unwrap();
        assert!(trim.trimmed);
        assert!(trim.messages_after < trim.messages_before);
        assert!(trim.messages_after >= 4);

        let sent = &model.requests()[0].messages;
        assert!(sent[0].is_system());
        assert_eq!(sent.last().unwrap().content, "summarize");
    }

    #[tokio::test]
    async fn test_parallel_batch_waits_for_all_calls() {
        let model = ScriptedModel::new(vec![
            Ok(ModelReply::ToolCalls {
                text: None,
                calls: vec![
                    tool_call("get_sleep_data", json!({"start_date": "2026-03-01", "end_date": "2026-03-07"})),
                    tool_call("get_workouts", json!({"start_date": "2026-03-01", "end_date": "2026-03-07"})),
                ],
            }),
            Ok(ModelReply::Final { text: "Done.".into() }),
        ]);
        let ctx = test_context(
            model.clone(),
            StaticHealthSource::heart_rate(72).with_delay(Duration::from_millis(20)),
        );

        let response = run_turn(&ctx, TurnRequest::new("s1", "u", "sleep vs workouts"))
            .await
            .unwrap();
        assert_eq!(response.metadata.invocations.len(), 2);
        let tool_results = model.requests()[1]
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .count();
        assert_eq!(tool_results, 2);
    }
}
