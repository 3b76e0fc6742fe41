//! Episodic and procedural write-back policies.
//!
//! Episodic: extract candidates from the exchange, gate them, and write each
//! one that passes as a fact or goal for the user. Procedural: write one
//! global pattern record iff the turn's outcome score reaches the threshold.
//! Each candidate write stands alone; one failure does not stop the rest.

use tracing::{info, warn};

use pulse_types::agent::ToolInvocation;
use pulse_types::error::MemoryError;
use pulse_types::memory::{MemoryRecord, NewMemory, PatternMetadata};

use crate::memory::cache::EmbeddingCacheStore;
use crate::memory::extractor::FactExtractor;
use crate::memory::store::MemoryStore;
use crate::memory::vector::VectorIndex;

use super::outcome::WorkflowOutcome;

/// Extract and persist facts and goals from one exchange. Returns what was written.
#[tracing::instrument(name = "write_back_episodic", skip_all, fields(user_id = %user_id))]
pub async fn write_back_episodic<V, C>(
    store: &MemoryStore<V, C>,
    extractor: &FactExtractor,
    user_id: &str,
    user_message: &str,
    assistant_reply: &str,
) -> Vec<MemoryRecord>
where
    V: VectorIndex,
    C: EmbeddingCacheStore,
{
    let candidates = extractor.extract(user_message, assistant_reply).await;
    let mut written = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match store.write(candidate.into_memory(user_id)).await {
            Ok(record) => written.push(record),
            Err(e) => warn!(error = %e, "Episodic write-back failed for candidate"),
        }
    }

    if !written.is_empty() {
        info!(count = written.len(), "Episodic memories written");
    }
    written
}

/// Persist the turn's capability sequence as a global pattern if it scored well enough.
///
/// The score is the only gate: the record is written if and only if it reaches
/// `threshold`, and it keeps every capability invoked, in call order.
pub async fn write_back_procedural<V, C>(
    store: &MemoryStore<V, C>,
    query: &str,
    invocations: &[ToolInvocation],
    outcome: &WorkflowOutcome,
    threshold: f64,
) -> Result<Option<MemoryRecord>, MemoryError>
where
    V: VectorIndex,
    C: EmbeddingCacheStore,
{
    if !outcome.meets(threshold) {
        return Ok(None);
    }

    let tools = invocations.iter().map(|i| i.name.clone()).collect();
    let metadata = PatternMetadata {
        tools,
        score: outcome.score,
    };
    let record = store.write(NewMemory::pattern(query, &metadata)).await?;
    info!(score = outcome.score, tools = ?metadata.tools, "Procedural pattern written");
    Ok(Some(record))
}
