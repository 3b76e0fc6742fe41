//! "Worth remembering" gate for episodic write-back candidates.
//!
//! A candidate passes when it is non-trivial (length and word count), is not a
//! greeting or a question, and states something quantifiable or goal-bearing.

use std::sync::LazyLock;

use regex::Regex;

const MIN_CHARS: usize = 15;
const MIN_WORDS: usize = 4;

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(hi|hello|hey|thanks|thank you|thx|ok|okay|good (morning|afternoon|evening|night)|bye|goodbye|cheers|great|cool|sure|sounds good)\b[^.!?]{0,20}[.!?]*\s*$",
    )
    .expect("greeting pattern is valid")
});

static QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(what|how|when|why|which|who|where|did|do|does|is|are|can|could|should|would|was|were|will)\b",
    )
    .expect("question pattern is valid")
});

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d|\b(bpm|kg|kgs|lbs?|pounds?|km|kilometers?|miles?|steps|hours?|minutes?|mins|calories|kcal|liters?|litres?|glasses|times|daily|weekly|nightly|every (day|night|week|morning))\b)",
    )
    .expect("quantity pattern is valid")
});

static GOAL_BEARING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(goal|aim|target|want to|trying to|plan to|planning to|hoping to|working on|improve|reduce|increase|lose|gain|train(ing)? for)\b",
    )
    .expect("goal pattern is valid")
});

// A terminator only ends a sentence when followed by whitespace or the end of
// input, so "72.5" stays whole.
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.!?;]+(?:\s+|$)|\n").expect("sentence pattern is valid")
});

/// Splits free text into trimmed, non-empty sentences.
pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
}

/// Whether a statement is goal-bearing (used to classify goals vs. facts).
pub fn is_goal_statement(text: &str) -> bool {
    GOAL_BEARING.is_match(text)
}

/// Gate applied to every extraction candidate before an episodic write.
pub fn is_worth_remembering(text: &str) -> bool {
    let text = text.trim();
    if text.chars().count() < MIN_CHARS || text.split_whitespace().count() < MIN_WORDS {
        return false;
    }
    if GREETING.is_match(text) || text.ends_with('?') || QUESTION.is_match(text) {
        return false;
    }
    QUANTITY.is_match(text) || GOAL_BEARING.is_match(text)
}
