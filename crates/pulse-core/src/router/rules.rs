//! Routing rules, evaluated in a fixed priority order: delete, list, set.

use std::sync::LazyLock;

use regex::Regex;

/// A request the router can serve without the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    DeleteGoals,
    ListGoals,
    SetGoal { goal: String },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::DeleteGoals => "delete_goals",
            Intent::ListGoals => "list_goals",
            Intent::SetGoal { .. } => "set_goal",
        }
    }
}

static DELETE_GOALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(please\s+)?((can|could)\s+you\s+)?(delete|remove|clear|forget|erase|reset|wipe)\s+(all\s+(of\s+)?)?(my\s+)?goals?(\s+please)?\s*[.!?]*\s*$",
    )
    .expect("delete pattern is valid")
});

static LIST_GOALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(what\s+(are|were)\s+my\s+(current\s+)?goals|what\s+goals\s+do\s+i\s+have|(list|show)(\s+me)?\s+(all\s+)?(of\s+)?my\s+goals|my\s+goals)\s*[.!?]*\s*$",
    )
    .expect("list pattern is valid")
});

static SET_GOAL: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"(?i)^\s*my\s+(new\s+|main\s+|current\s+)?goal\s+(is|will\s+be)\s*:?\s*(?P<goal>.+)$",
        r"(?i)^\s*(please\s+)?(set|add|save)\s+(a\s+)?(new\s+)?(my\s+)?goal\s*(:|\bof\b)?\s*(?P<goal>.+)$",
        r"(?i)^\s*(new\s+)?goal\s*:\s*(?P<goal>.+)$",
    ]
    .map(|pattern| Regex::new(pattern).expect("set-goal pattern is valid"))
});

/// Match `text` against the rules. Pure; touches no store.
pub fn classify(text: &str) -> Option<Intent> {
    let text = text.trim();
    if DELETE_GOALS.is_match(text) {
        return Some(Intent::DeleteGoals);
    }
    if LIST_GOALS.is_match(text) {
        return Some(Intent::ListGoals);
    }
    SET_GOAL
        .iter()
        .find_map(|rule| rule.captures(text))
        .and_then(|caps| clean_goal(&caps["goal"]))
        .map(|goal| Intent::SetGoal { goal })
}

/// Strip a leading "to " and trailing punctuation from a captured goal.
fn clean_goal(raw: &str) -> Option<String> {
    let mut goal = raw.trim();
    if goal.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("to ")) {
        goal = goal[3..].trim_start();
    }
    let goal = goal.trim_end_matches(['.', '!', ' ']);
    (!goal.is_empty()).then(|| goal.to_string())
}
