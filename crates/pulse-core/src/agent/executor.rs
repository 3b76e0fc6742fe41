//! Capability execution for one TOOL_EXEC batch.
//!
//! Every requested call is resolved through the capability table and run
//! under the tool timeout. Calls in a batch run concurrently; each outcome is
//! captured on its own [`ToolInvocation`] so one failure never poisons its
//! siblings.

use futures_util::future::join_all;
use serde_json::json;
use tracing::{Instrument, debug, info_span, warn};

use pulse_types::agent::ToolInvocation;
use pulse_types::error::CapabilityError;
use pulse_types::llm::{MessageRole, ToolCall};
use pulse_types::memory::{MemoryKind, OwnerScope, RankedMemory};

use crate::chat::short_term::ShortTermStore;
use crate::memory::cache::EmbeddingCacheStore;
use crate::memory::vector::VectorIndex;

use super::capability::{CapabilityCall, CapabilityTable};
use super::context::AssistantContext;

const DEFAULT_RECALL_LIMIT: u32 = 20;

/// Runs capability calls on behalf of one user in one session.
pub struct CapabilityExecutor<'a, S, V, C> {
    ctx: &'a AssistantContext<S, V, C>,
    table: &'a CapabilityTable,
    session_id: &'a str,
    user_id: &'a str,
}

impl<'a, S, V, C> CapabilityExecutor<'a, S, V, C>
where
    S: ShortTermStore,
    V: VectorIndex,
    C: EmbeddingCacheStore,
{
    pub fn new(
        ctx: &'a AssistantContext<S, V, C>,
        table: &'a CapabilityTable,
        session_id: &'a str,
        user_id: &'a str,
    ) -> Self {
        Self {
            ctx,
            table,
            session_id,
            user_id,
        }
    }

    /// Execute a batch concurrently, preserving request order in the result.
    pub async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolInvocation> {
        join_all(calls.iter().map(|call| self.execute(call))).await
    }

    /// Execute one call. Never fails; errors are recorded on the invocation.
    pub async fn execute(&self, call: &ToolCall) -> ToolInvocation {
        let span = info_span!("capability", name = %call.name, call_id = %call.id);
        let outcome = self.run(call).instrument(span).await;

        let (result, error) = match outcome {
            Ok(value) => {
                debug!(capability = %call.name, "Capability succeeded");
                (Some(value), None)
            }
            Err(e) => {
                warn!(capability = %call.name, error = %e, "Capability failed");
                (None, Some(e.to_string()))
            }
        };

        ToolInvocation {
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result,
            error,
        }
    }

    async fn run(&self, call: &ToolCall) -> Result<serde_json::Value, CapabilityError> {
        let resolved = self.table.resolve(call)?;
        let timeout = self.ctx.tool_timeout();
        tokio::time::timeout(timeout, self.dispatch(resolved))
            .await
            .unwrap_or_else(|_| {
                Err(CapabilityError::Timeout {
                    name: call.name.clone(),
                    secs: timeout.as_secs(),
                })
            })
    }

    async fn dispatch(&self, call: CapabilityCall) -> Result<serde_json::Value, CapabilityError> {
        let name = call.name();
        let memory_config = &self.ctx.config.memory;

        match call {
            CapabilityCall::GetHealthMetrics(args) => {
                self.ctx.health.health_metrics(self.user_id, &args).await
            }
            CapabilityCall::GetSleepData(args) => self.ctx.health.sleep_data(self.user_id, &args).await,
            CapabilityCall::GetWorkouts(args) => self.ctx.health.workouts(self.user_id, &args).await,
            CapabilityCall::FetchGoals(args) => {
                let goals: Vec<serde_json::Value> = match args.query.as_deref().map(str::trim) {
                    Some(query) if !query.is_empty() => self
                        .ctx
                        .episodic
                        .search_kind(
                            query,
                            Some(&OwnerScope::user(self.user_id)),
                            Some(MemoryKind::Goal),
                            memory_config.episodic_top_k,
                        )
                        .await
                        .map_err(|e| execution(name, e))?
                        .into_iter()
                        .map(|hit| {
                            json!({
                                "goal": hit.record.description,
                                "set_at": hit.record.created_at.to_rfc3339(),
                                "similarity": hit.similarity,
                            })
                        })
                        .collect(),
                    _ => self
                        .ctx
                        .episodic
                        .latest_goals(self.user_id)
                        .await
                        .map_err(|e| execution(name, e))?
                        .into_iter()
                        .map(|record| {
                            json!({
                                "goal": record.description,
                                "set_at": record.created_at.to_rfc3339(),
                            })
                        })
                        .collect(),
                };
                Ok(json!({ "goals": goals }))
            }
            CapabilityCall::SuggestToolPattern(args) => {
                let hits = self
                    .ctx
                    .procedural
                    .search(
                        &args.query,
                        Some(&OwnerScope::Global),
                        memory_config.procedural_top_k,
                    )
                    .await
                    .map_err(|e| execution(name, e))?;
                let patterns: Vec<serde_json::Value> = hits.iter().map(pattern_json).collect();
                Ok(json!({ "patterns": patterns }))
            }
            CapabilityCall::RecallConversation(args) => {
                // Session-scoped only: never served from long-term memory.
                let limit = args
                    .limit
                    .unwrap_or(DEFAULT_RECALL_LIMIT)
                    .clamp(1, memory_config.history_limit.max(1) as u32) as usize;
                let messages: Vec<serde_json::Value> = self
                    .ctx
                    .short_term
                    .read(self.session_id, limit)
                    .await
                    .map_err(|e| execution(name, e))?
                    .into_iter()
                    .filter(|m| matches!(m.role, MessageRole::User | MessageRole::Assistant))
                    .filter(|m| !m.content.trim().is_empty())
                    .map(|m| {
                        json!({
                            "role": m.role.to_string(),
                            "content": m.content,
                            "at": m.created_at.to_rfc3339(),
                        })
                    })
                    .collect();
                Ok(json!({ "messages": messages }))
            }
        }
    }
}

fn pattern_json(hit: &RankedMemory) -> serde_json::Value {
    json!({
        "query": hit.record.description,
        "tools": hit.record.metadata.get("tools").cloned().unwrap_or_default(),
        "score": hit.record.outcome_score(),
        "similarity": hit.similarity,
    })
}

fn execution(name: &str, err: impl std::fmt::Display) -> CapabilityError {
    CapabilityError::Execution {
        name: name.to_string(),
        message: err.to_string(),
    }
}
