//! Episodic fact extraction from a finished exchange.
//!
//! Two strategies share one entry point:
//! - [`HeuristicFactExtractor`] splits the user's message into sentences and
//!   classifies each as a goal or a fact.
//! - [`LlmFactExtractor`] asks the model for a JSON array of candidates.
//!   Malformed output logs a warning and yields nothing.
//!
//! Whatever the strategy, every candidate is passed through
//! [`is_worth_remembering`] before it is handed back, so the gate holds no
//! matter how noisy the extraction is.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use pulse_types::llm::{CompletionRequest, Message};
use pulse_types::memory::{MemoryKind, NewMemory};

use super::filter::{is_goal_statement, is_worth_remembering, sentences};
use crate::llm::box_provider::BoxModelProvider;
use crate::llm::retry::complete_with_retry;

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract durable health facts and goals about the user from one exchange with a health assistant.

Rules:
1. Extract ONLY statements the user made about themselves that stay true beyond this conversation
2. Each item must be a single, self-contained sentence written in the first person
3. Do NOT include greetings, pleasantries, questions, or anything the assistant said
4. Prefer specific, quantified statements ("I sleep about 7 hours") over vague ones
5. A goal is something the user is working towards; everything else is a fact

Return a JSON array. Each element must have exactly these fields:
- "text": string (the statement)
- "kind": string (one of: "fact", "goal")

If there is nothing worth extracting, return an empty array: []

Example output:
[
  {"text": "My resting heart rate is usually around 58 bpm", "kind": "fact"},
  {"text": "I want to run 3 times per week", "kind": "goal"}
]"#;

/// A statement proposed for episodic write-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: MemoryKind,
    pub text: String,
}

impl Candidate {
    pub fn into_memory(self, user_id: &str) -> NewMemory {
        match self.kind {
            MemoryKind::Goal => NewMemory::goal(user_id, self.text),
            _ => NewMemory::fact(user_id, self.text),
        }
    }
}

/// Sentence-level rule-based extraction over the user's message.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicFactExtractor;

impl HeuristicFactExtractor {
    pub fn extract(&self, user_message: &str) -> Vec<Candidate> {
        sentences(user_message)
            .map(|sentence| Candidate {
                kind: if is_goal_statement(sentence) {
                    MemoryKind::Goal
                } else {
                    MemoryKind::Fact
                },
                text: sentence.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    text: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Model-backed extraction with graceful degradation.
pub struct LlmFactExtractor {
    provider: Arc<BoxModelProvider>,
    model: String,
    timeout: Duration,
}

impl LlmFactExtractor {
    pub fn new(provider: Arc<BoxModelProvider>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout,
        }
    }

    #[tracing::instrument(name = "extract_memory", skip_all, fields(provider = self.provider.name()))]
    pub async fn extract(&self, user_message: &str, assistant_reply: &str) -> Vec<Candidate> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(EXTRACTION_SYSTEM_PROMPT),
                Message::user(format!(
                    "User said:\n{user_message}\n\nAssistant replied:\n{assistant_reply}"
                )),
            ],
            tools: Vec::new(),
            max_tokens: 512,
            temperature: Some(0.0),
        };

        let response = match complete_with_retry(&self.provider, &request, self.timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Memory extraction call failed; nothing extracted");
                return Vec::new();
            }
        };

        let raw_content = response.reply.text().unwrap_or_default().trim();
        let raw: Vec<RawCandidate> = match serde_json::from_str(strip_code_fence(raw_content)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    error = %e,
                    content_preview = %raw_content.chars().take(200).collect::<String>(),
                    "Failed to parse memory extraction JSON; returning empty result"
                );
                return Vec::new();
            }
        };

        raw.into_iter()
            .filter_map(|entry| {
                let kind = match entry.kind.as_deref().map(str::to_lowercase).as_deref() {
                    Some("goal") => MemoryKind::Goal,
                    Some("fact") => MemoryKind::Fact,
                    None => {
                        if is_goal_statement(&entry.text) {
                            MemoryKind::Goal
                        } else {
                            MemoryKind::Fact
                        }
                    }
                    Some(other) => {
                        warn!(kind = other, text = %entry.text, "Unknown memory kind from model; skipping");
                        return None;
                    }
                };
                Some(Candidate {
                    kind,
                    text: entry.text.trim().to_string(),
                })
            })
            .collect()
    }
}

/// Models often wrap JSON in a markdown fence.
fn strip_code_fence(content: &str) -> &str {
    content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(content)
}

/// The extraction strategy configured for write-back.
pub enum FactExtractor {
    Heuristic(HeuristicFactExtractor),
    Llm(LlmFactExtractor),
}

impl FactExtractor {
    pub fn heuristic() -> Self {
        FactExtractor::Heuristic(HeuristicFactExtractor)
    }

    /// Extract gated, de-duplicated candidates from one exchange.
    pub async fn extract(&self, user_message: &str, assistant_reply: &str) -> Vec<Candidate> {
        let raw = match self {
            FactExtractor::Heuristic(h) => h.extract(user_message),
            FactExtractor::Llm(m) => m.extract(user_message, assistant_reply).await,
        };
        let total = raw.len();

        let mut seen = HashSet::new();
        let kept: Vec<Candidate> = raw
            .into_iter()
            .filter(|c| is_worth_remembering(&c.text))
            .filter(|c| seen.insert(c.text.to_lowercase()))
            .collect();

        debug!(total, kept = kept.len(), "Extraction candidates gated");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use pulse_types::llm::ModelReply;

    fn llm_extractor(reply: &str) -> FactExtractor {
        let model = ScriptedModel::new(vec![Ok(ModelReply::Final {
            text: reply.to_string(),
        })]);
        FactExtractor::Llm(LlmFactExtractor::new(
            Arc::new(BoxModelProvider::new(model)),
            "test-model",
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn test_heuristic_splits_and_classifies() {
        let extractor = FactExtractor::heuristic();
        let candidates = extractor
            .extract(
                "Hi there! My resting heart rate is usually 58 bpm. I want to improve my sleep consistency.",
                "Noted.",
            )
            .await;

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].kind, MemoryKind::Fact);
        assert!(candidates[0].text.contains("58 bpm"));
        assert_eq!(candidates[1].kind, MemoryKind::Goal);
    }

    #[tokio::test]
    async fn test_heuristic_drops_questions_and_pleasantries() {
        let extractor = FactExtractor::heuristic();
        let candidates = extractor
            .extract("Thanks! What was my average heart rate last week?", "It was 72 bpm.")
            .await;
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_heuristic_dedups_repeated_sentences() {
        let extractor = FactExtractor::heuristic();
        let candidates = extractor
            .extract("I sleep about 7 hours a night. I sleep about 7 hours a night.", "")
            .await;
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_heuristic_keeps_decimal_values_whole() {
        let extractor = FactExtractor::heuristic();
        let candidates = extractor.extract("I weigh 72.5 kg", "").await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "I weigh 72.5 kg");

        let candidates = extractor
            .extract("My resting heart rate is 58.5 bpm. I sleep 7.5 hours a night.", "")
            .await;
        let texts: Vec<_> = candidates.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            ["My resting heart rate is 58.5 bpm", "I sleep 7.5 hours a night"]
        );
    }

    #[tokio::test]
    async fn test_llm_extraction_parses_and_gates() {
        let extractor = llm_extractor(
            r#"```json
[
  {"text": "My resting heart rate is usually around 58 bpm", "kind": "fact"},
  {"text": "I want to run 3 times per week", "kind": "goal"},
  {"text": "hello", "kind": "fact"}
]
```"#,
        );
        let candidates = extractor.extract("...", "...").await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].kind, MemoryKind::Goal);
    }

    #[tokio::test]
    async fn test_llm_malformed_output_yields_nothing() {
        let extractor = llm_extractor("Sure! Here are the facts: the user runs.");
        assert!(extractor.extract("I run 5 km daily", "Nice").await.is_empty());
    }

    #[test]
    fn test_candidate_into_memory() {
        let memory = Candidate {
            kind: MemoryKind::Goal,
            text: "run 3 times per week".into(),
        }
        .into_memory("alice");
        assert_eq!(memory.kind, MemoryKind::Goal);
        assert_eq!(memory.owner, pulse_types::memory::OwnerScope::user("alice"));
    }
}
