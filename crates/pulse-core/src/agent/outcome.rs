//! WorkflowOutcome: a success score for one completed turn.
//!
//! The score is derived purely from the turn's capability-invocation trace and
//! final answer, and gates procedural write-back.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use pulse_types::agent::ToolInvocation;

use crate::memory::filter::sentences;

const CLARIFICATION_PENALTY: f64 = 0.4;
const FAILURE_PENALTY: f64 = 0.15;
const REPEAT_PENALTY: f64 = 0.1;
const EXCESS_CALL_PENALTY: f64 = 0.05;
const TRUNCATION_PENALTY: f64 = 0.3;
/// Calls beyond this many are penalized.
const EFFICIENT_CALLS: usize = 4;

static CLARIFICATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(could|can|would) you (please )?(clarify|specify|tell me|let me know|confirm)\b|\bdo you mean\b|\bwhich (metric|date|day|week|period|time range|workout)\b|\bplease (clarify|specify|provide)\b",
    )
    .expect("clarification pattern is valid")
});

/// Scored summary of a turn's capability usage.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutcome {
    pub score: f64,
    pub calls: usize,
    pub failed: usize,
    pub repeated: usize,
    pub asked_clarification: bool,
    pub truncated: bool,
}

impl WorkflowOutcome {
    pub fn compute(invocations: &[ToolInvocation], final_text: Option<&str>, truncated: bool) -> Self {
        let calls = invocations.len();
        let failed = invocations.iter().filter(|i| !i.succeeded()).count();
        let succeeded = calls - failed;

        let mut seen = HashSet::new();
        let repeated = invocations
            .iter()
            .filter(|i| !seen.insert((i.name.as_str(), i.arguments.to_string())))
            .count();

        let final_text = final_text.map(str::trim).filter(|t| !t.is_empty());
        let asked_clarification = final_text.is_some_and(is_clarification);

        // A turn where no capability produced data has nothing worth learning.
        let score = if final_text.is_none() || succeeded == 0 {
            0.0
        } else {
            let mut score = 1.0;
            if asked_clarification {
                score -= CLARIFICATION_PENALTY;
            }
            score -= FAILURE_PENALTY * failed as f64;
            score -= REPEAT_PENALTY * repeated as f64;
            score -= EXCESS_CALL_PENALTY * calls.saturating_sub(EFFICIENT_CALLS) as f64;
            if truncated {
                score -= TRUNCATION_PENALTY;
            }
            score.clamp(0.0, 1.0)
        };

        Self {
            score,
            calls,
            failed,
            repeated,
            asked_clarification,
            truncated,
        }
    }

    /// Whether the turn earned a procedural record.
    pub fn meets(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}

/// The answer hands the question back to the user instead of answering it.
///
/// Only the closing sentence counts: a complete answer that ends with a
/// courtesy question ("Anything else?") is not a clarification request.
fn is_clarification(text: &str) -> bool {
    sentences(text)
        .last()
        .is_some_and(|closing| CLARIFICATION.is_match(closing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(name: &str, args: serde_json::Value) -> ToolInvocation {
        ToolInvocation {
            call_id: "c".into(),
            name: name.into(),
            arguments: args,
            result: Some(json!({"ok": true})),
            error: None,
        }
    }

    fn failed(name: &str) -> ToolInvocation {
        ToolInvocation {
            error: Some("boom".into()),
            result: None,
            ..ok(name, json!({}))
        }
    }

    #[test]
    fn test_clean_single_call_scores_full() {
        let trace = vec![ok("get_health_metrics", json!({"metric": "heart_rate"}))];
        let outcome = WorkflowOutcome::compute(&trace, Some("Your average was 72 bpm."), false);
        assert_eq!(outcome.score, 1.0);
    }

    #[test]
    fn test_no_calls_or_no_answer_scores_zero() {
        assert_eq!(WorkflowOutcome::compute(&[], Some("Hello!"), false).score, 0.0);
        let trace = vec![ok("get_sleep_data", json!({}))];
        assert_eq!(WorkflowOutcome::compute(&trace, None, false).score, 0.0);
        assert_eq!(WorkflowOutcome::compute(&trace, Some("  "), false).score, 0.0);
    }

    #[test]
    fn test_penalties_accumulate() {
        let trace = vec![
            ok("get_health_metrics", json!({"metric": "steps"})),
            failed("get_sleep_data"),
            ok("get_health_metrics", json!({"metric": "steps"})),
        ];
        let outcome = WorkflowOutcome::compute(&trace, Some("You walked 8,000 steps a day."), false);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.repeated, 1);
        assert!((outcome.score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_clarification_and_truncation_penalized() {
        let trace = vec![ok("get_workouts", json!({}))];
        let asking = WorkflowOutcome::compute(&trace, Some("Which workout do you mean?"), false);
        assert!(asking.asked_clarification);
        assert!((asking.score - 0.6).abs() < 1e-9);

        let truncated = WorkflowOutcome::compute(&trace, Some("Partial answer."), true);
        assert!((truncated.score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_only_failed_calls_score_zero() {
        let outcome = WorkflowOutcome::compute(
            &[failed("get_sleep_data")],
            Some("I could not read your sleep data."),
            false,
        );
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.score, 0.0);
        assert!(!outcome.meets(0.7));
    }

    #[test]
    fn test_courtesy_question_is_not_clarification() {
        let trace = vec![ok("get_health_metrics", json!({"metric": "heart_rate"}))];
        let outcome = WorkflowOutcome::compute(
            &trace,
            Some("Your average was 72 bpm. Anything else?"),
            false,
        );
        assert!(!outcome.asked_clarification);
        assert_eq!(outcome.score, 1.0);

        let asking = WorkflowOutcome::compute(
            &trace,
            Some("I found two metrics. Could you clarify which one you want?"),
            false,
        );
        assert!(asking.asked_clarification);
    }

    #[test]
    fn test_excess_calls_penalized_and_clamped() {
        let trace: Vec<_> = (0..6)
            .map(|i| ok("get_health_metrics", json!({ "metric": format!("m{i}") })))
            .collect();
        let outcome = WorkflowOutcome::compute(&trace, Some("Done."), false);
        assert!((outcome.score - 0.9).abs() < 1e-9);

        let trace: Vec<_> = (0..10).map(|_| failed("get_sleep_data")).collect();
        assert_eq!(WorkflowOutcome::compute(&trace, Some("Sorry."), true).score, 0.0);
    }

    #[test]
    fn test_meets_threshold_boundary() {
        let outcome = WorkflowOutcome {
            score: 0.7,
            calls: 1,
            failed: 0,
            repeated: 0,
            asked_clarification: false,
            truncated: false,
        };
        assert!(outcome.meets(0.7));
        assert!(!outcome.meets(0.7000001));
        assert!(outcome.meets(0.6999999));
    }
}
