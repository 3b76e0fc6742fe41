//! Long-term memory types for Pulse.
//!
//! `MemoryRecord` generalizes both tiers of long-term memory:
//! - Episodic records: user-scoped facts and goals.
//! - Procedural records: globally-scoped query → capability-sequence patterns
//!   with the outcome score of the turn that produced them.
//!
//! Records are immutable once written. Newer records supersede older ones at
//! read time through recency-aware ranking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which long-term store a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    Episodic,
    Procedural,
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryTier::Episodic => write!(f, "episodic"),
            MemoryTier::Procedural => write!(f, "procedural"),
        }
    }
}

/// Kind of memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// A durable statement about the user ("resting heart rate is usually 58").
    Fact,
    /// Something the user is working towards ("run 3 times per week").
    Goal,
    /// A learned capability sequence for a query shape.
    Pattern,
}

impl MemoryKind {
    /// The tier this kind of record belongs to.
    pub fn tier(&self) -> MemoryTier {
        match self {
            MemoryKind::Fact | MemoryKind::Goal => MemoryTier::Episodic,
            MemoryKind::Pattern => MemoryTier::Procedural,
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryKind::Fact => write!(f, "fact"),
            MemoryKind::Goal => write!(f, "goal"),
            MemoryKind::Pattern => write!(f, "pattern"),
        }
    }
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fact" => Ok(MemoryKind::Fact),
            "goal" => Ok(MemoryKind::Goal),
            "pattern" => Ok(MemoryKind::Pattern),
            other => Err(format!("invalid memory kind: '{other}'")),
        }
    }
}

/// The identity a memory read or write is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "user_id", rename_all = "lowercase")]
pub enum OwnerScope {
    User(String),
    Global,
}

impl OwnerScope {
    pub fn user(user_id: impl Into<String>) -> Self {
        OwnerScope::User(user_id.into())
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerScope::User(id) => write!(f, "user:{id}"),
            OwnerScope::Global => write!(f, "global"),
        }
    }
}

impl FromStr for OwnerScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(OwnerScope::Global);
        }
        match s.strip_prefix("user:") {
            Some(id) if !id.is_empty() => Ok(OwnerScope::User(id.to_string())),
            _ => Err(format!("invalid owner scope: '{s}'")),
        }
    }
}

/// A persisted long-term memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Owner-scoped id: `{owner}:{created_at_micros}:{seq}`.
    pub id: String,
    pub owner: OwnerScope,
    pub kind: MemoryKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Structured extras: extracted metric, capability list, outcome score.
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Outcome score stored in procedural metadata, if present.
    pub fn outcome_score(&self) -> Option<f64> {
        self.metadata.get("score").and_then(|v| v.as_f64())
    }
}

/// A record to be written; the store assigns the id and the embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub owner: OwnerScope,
    pub kind: MemoryKind,
    pub description: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NewMemory {
    pub fn fact(user_id: &str, description: impl Into<String>) -> Self {
        Self {
            owner: OwnerScope::user(user_id),
            kind: MemoryKind::Fact,
            description: description.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn goal(user_id: &str, description: impl Into<String>) -> Self {
        Self {
            owner: OwnerScope::user(user_id),
            kind: MemoryKind::Goal,
            description: description.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn pattern(query: impl Into<String>, metadata: &PatternMetadata) -> Self {
        Self {
            owner: OwnerScope::Global,
            kind: MemoryKind::Pattern,
            description: query.into(),
            metadata: serde_json::to_value(metadata).unwrap_or_default(),
        }
    }
}

/// Metadata recorded on procedural pattern records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMetadata {
    /// Capability names in invocation order.
    pub tools: Vec<String>,
    pub score: f64,
}

/// A record returned from similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMemory {
    pub record: MemoryRecord,
    /// Cosine similarity to the query, 1.0 = identical direction.
    pub similarity: f32,
}
