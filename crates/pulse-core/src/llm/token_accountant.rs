//! Token counting and context trimming.
//!
//! Counting goes through a pluggable [`TokenCounter`]; when none is installed
//! (or it fails on any message) the whole sequence is counted with the coarse
//! characters/4 estimate so that before/after numbers stay comparable.
//!
//! Trimming removes the oldest non-system message until the sequence fits in
//! `budget * threshold` or the `min_keep` floor is reached. An assistant
//! message that requested capability calls is removed together with its tool
//! results so the remaining sequence never starts with an orphaned result.

use std::sync::Arc;

use tracing::{debug, warn};

use pulse_types::agent::{CountMethod, TrimStats};
use pulse_types::llm::{Message, MessageRole};

/// The precise counter could not count a text.
#[derive(Debug, thiserror::Error)]
#[error("tokenizer unavailable: {0}")]
pub struct TokenizerUnavailable(pub String);

/// A deterministic tokenizer-equivalent measure.
pub trait TokenCounter: Send + Sync {
    fn count_text(&self, text: &str) -> Result<u32, TokenizerUnavailable>;
}

/// Token total for a message sequence and how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    pub tokens: u32,
    pub method: CountMethod,
}

/// Counts message sequences and trims them to a budget.
#[derive(Clone)]
pub struct TokenAccountant {
    counter: Option<Arc<dyn TokenCounter>>,
    threshold: f64,
}

impl TokenAccountant {
    /// Accountant using the characters/4 estimate only.
    pub fn estimating(threshold: f64) -> Self {
        Self {
            counter: None,
            threshold,
        }
    }

    pub fn with_counter(counter: Arc<dyn TokenCounter>, threshold: f64) -> Self {
        Self {
            counter: Some(counter),
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Count the tokens of a message sequence.
    pub fn count(&self, messages: &[Message]) -> TokenCount {
        let (costs, method) = self.message_costs(messages);
        TokenCount {
            tokens: costs.iter().sum(),
            method,
        }
    }

    /// Trim `messages` until they fit `budget * threshold`, never going below
    /// `min_keep` messages and never removing a system message.
    pub fn trim(
        &self,
        mut messages: Vec<Message>,
        budget: u32,
        min_keep: usize,
    ) -> (Vec<Message>, TrimStats) {
        let (mut costs, method) = self.message_costs(&messages);
        let limit = (budget as f64 * self.threshold).floor() as u32;

        let messages_before = messages.len();
        let tokens_before: u32 = costs.iter().sum();
        let mut total = tokens_before;
        let mut floor_hit = false;

        while total > limit {
            if messages.len() <= min_keep {
                floor_hit = true;
                break;
            }
            let Some((start, len)) = oldest_removable_unit(&messages) else {
                floor_hit = true;
                break;
            };
            if messages.len() - len < min_keep {
                floor_hit = true;
                break;
            }
            let removed: u32 = costs.drain(start..start + len).sum();
            messages.drain(start..start + len);
            total -= removed;
        }

        if floor_hit {
            warn!(
                budget,
                limit,
                tokens = total,
                messages = messages.len(),
                min_keep,
                "Context still over budget after trimming to the minimum kept messages"
            );
        }

        let stats = TrimStats {
            messages_before,
            messages_after: messages.len(),
            tokens_before,
            tokens_after: total,
            trimmed: messages.len() < messages_before,
            floor_hit,
            method,
        };

        if stats.trimmed {
            debug!(
                messages_before = stats.messages_before,
                messages_after = stats.messages_after,
                tokens_before = stats.tokens_before,
                tokens_after = stats.tokens_after,
                method = ?stats.method,
                "Trimmed conversation context"
            );
        }

        (messages, stats)
    }

    /// Per-message costs, all computed with the same method.
    fn message_costs(&self, messages: &[Message]) -> (Vec<u32>, CountMethod) {
        if let Some(counter) = &self.counter {
            let precise: Result<Vec<u32>, TokenizerUnavailable> = messages
                .iter()
                .map(|m| counter.count_text(&message_text(m)))
                .collect();
            match precise {
                Ok(costs) => return (costs, CountMethod::Tokenizer),
                Err(e) => debug!(error = %e, "Falling back to character estimate"),
            }
        }

        let costs = messages
            .iter()
            .map(|m| estimate_tokens(&message_text(m)))
            .collect();
        (costs, CountMethod::CharEstimate)
    }
}

/// Coarse token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    text.chars().count().div_ceil(4) as u32
}

/// Everything in a message that occupies context: content plus tool-call payloads.
fn message_text(message: &Message) -> String {
    let mut text = message.content.clone();
    for call in &message.tool_calls {
        text.push(' ');
        text.push_str(&call.name);
        text.push(' ');
        text.push_str(&call.arguments.to_string());
    }
    text
}

/// The oldest non-system message, extended over the tool results that answer it.
///
/// Returns `(start, len)` of the unit to remove.
fn oldest_removable_unit(messages: &[Message]) -> Option<(usize, usize)> {
    let start = messages.iter().position(|m| !m.is_system())?;
    let mut end = start + 1;
    if !messages[start].tool_calls.is_empty() {
        while end < messages.len() && messages[end].role == MessageRole::Tool {
            end += 1;
        }
    }
    Some((start, end - start))
}
