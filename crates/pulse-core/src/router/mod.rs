//! Intent Router: deterministic pre-model dispatch.
//!
//! A small, fixed-priority set of regex rules recognizes goal management
//! requests and serves them straight from the Episodic store. A routed message
//! never reaches the model or any other capability.

pub mod rules;

use tracing::info;

use pulse_types::error::MemoryError;
use pulse_types::memory::{MemoryKind, NewMemory, OwnerScope};

use crate::memory::cache::EmbeddingCacheStore;
use crate::memory::store::MemoryStore;
use crate::memory::vector::VectorIndex;

pub use rules::{Intent, classify};

/// A message the router handled, with the terminal response.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedAction {
    pub intent: Intent,
    pub response: String,
}

/// Classify `text` and, on a match, execute it against the user's episodic memory.
///
/// Returns `Ok(None)` when no rule matches.
pub async fn route<V, C>(
    episodic: &MemoryStore<V, C>,
    user_id: &str,
    text: &str,
) -> Result<Option<RoutedAction>, MemoryError>
where
    V: VectorIndex,
    C: EmbeddingCacheStore,
{
    let Some(intent) = classify(text) else {
        return Ok(None);
    };
    info!(user_id, intent = intent.name(), "Message routed");

    let response = match &intent {
        Intent::SetGoal { goal } => {
            episodic.write(NewMemory::goal(user_id, goal.as_str())).await?;
            format!("Got it. I've saved your goal: {goal}.")
        }
        Intent::ListGoals => {
            let goals = episodic.latest_goals(user_id).await?;
            if goals.is_empty() {
                "You don't have any goals saved yet.".to_string()
            } else {
                let lines: Vec<String> = goals
                    .iter()
                    .enumerate()
                    .map(|(i, g)| format!("{}. {}", i + 1, g.description))
                    .collect();
                format!("Here are your goals:\n{}", lines.join("\n"))
            }
        }
        Intent::DeleteGoals => {
            let removed = episodic
                .delete(&OwnerScope::user(user_id), Some(MemoryKind::Goal))
                .await?;
            match removed {
                0 => "You don't have any goals to delete.".to_string(),
                1 => "Deleted 1 goal.".to_string(),
                n => format!("Deleted {n} goals."),
            }
        }
    };

    Ok(Some(RoutedAction { intent, response }))
}
