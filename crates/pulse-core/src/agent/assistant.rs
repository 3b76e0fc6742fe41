//! Assistant facade: serializes turns per session and runs them.

use std::sync::Arc;

use pulse_types::agent::TurnResponse;

use crate::chat::session_lock::SessionLocks;
use crate::chat::short_term::ShortTermStore;
use crate::memory::cache::EmbeddingCacheStore;
use crate::memory::vector::VectorIndex;

use super::context::AssistantContext;
use super::orchestrator::{TurnFailure, TurnRequest, run_turn};

/// Entry point for callers. Cheap to clone; clones share the context and locks.
pub struct Assistant<S, V, C> {
    ctx: Arc<AssistantContext<S, V, C>>,
    locks: Arc<SessionLocks>,
}

impl<S, V, C> Clone for Assistant<S, V, C> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S, V, C> Assistant<S, V, C>
where
    S: ShortTermStore,
    V: VectorIndex,
    C: EmbeddingCacheStore,
{
    pub fn new(ctx: AssistantContext<S, V, C>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            locks: Arc::new(SessionLocks::new()),
        }
    }

    pub fn context(&self) -> &AssistantContext<S, V, C> {
        &self.ctx
    }

    /// Run a turn once no other turn for the same session is in flight.
    pub async fn handle(&self, request: TurnRequest) -> Result<TurnResponse, TurnFailure> {
        let guard = self.locks.acquire(&request.session_id).await;
        let result = run_turn(self.ctx.as_ref(), request).await;
        drop(guard);
        self.locks.prune();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pulse_types::llm::{MessageRole, ModelReply};

    use crate::testing::{ScriptedModel, StaticHealthSource, test_context};

    fn reply(text: &str) -> Result<ModelReply, pulse_types::llm::LlmError> {
        Ok(ModelReply::Final { text: text.into() })
    }

    #[tokio::test]
    async fn test_same_session_turns_do_not_interleave() {
        let model = ScriptedModel::new(vec![reply("first answer"), reply("second answer")])
            .with_delay(Duration::from_millis(30));
        let assistant = Assistant::new(test_context(model, StaticHealthSource::heart_rate(72)));

        let (a, b) = tokio::join!(
            assistant.handle(TurnRequest::new("s1", "u", "first question")),
            assistant.handle(TurnRequest::new("s1", "u", "second question")),
        );
        a.unwrap();
        b.unwrap();

        let log = assistant.context().short_term.read("s1", 10).await.unwrap();
        let roles: Vec<_> = log.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant
            ]
        );
    }

    #[tokio::test]
    async fn test_distinct_sessions_run_in_parallel() {
        let model = ScriptedModel::new(vec![reply("a"), reply("b")]).with_delay(Duration::from_millis(200));
        let assistant = Assistant::new(test_context(model, StaticHealthSource::heart_rate(72)));

        let started = std::time::Instant::now();
        let (a, b) = tokio::join!(
            assistant.handle(TurnRequest::new("s1", "alice", "question one")),
            assistant.handle(TurnRequest::new("s2", "bob", "question two")),
        );
        a.unwrap();
        b.unwrap();
        assert!(started.elapsed() < Duration::from_millis(390));
    }
}
