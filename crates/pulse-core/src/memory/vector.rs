//! VectorIndex trait: the nearest-neighbour backing store for one memory tier.
//!
//! Each tier (episodic, procedural) gets its own index instance. Implementations
//! must be safe under concurrent writers; records carry owner-scoped unique ids
//! so concurrent adds never collide.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use pulse_types::error::RepositoryError;
use pulse_types::memory::{MemoryKind, MemoryRecord, OwnerScope, RankedMemory};

/// Nearest-neighbour search over memory records, filterable by owner and kind.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// The LanceDB implementation lives in pulse-infra.
pub trait VectorIndex: Send + Sync {
    /// Fixed dimensionality of every vector in this index.
    fn dimension(&self) -> usize;

    /// Persist a record with its embedding.
    fn add(
        &self,
        record: &MemoryRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Approximate nearest neighbours of `embedding`, most similar first.
    ///
    /// `owner: None` searches across all owners.
    fn search(
        &self,
        owner: Option<&OwnerScope>,
        kind: Option<MemoryKind>,
        embedding: &[f32],
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<RankedMemory>, RepositoryError>> + Send;

    /// All records of an owner, optionally of one kind, in no particular order.
    fn list(
        &self,
        owner: &OwnerScope,
        kind: Option<MemoryKind>,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send;

    /// Delete an owner's records (optionally of one kind). Returns the number removed.
    fn delete(
        &self,
        owner: &OwnerScope,
        kind: Option<MemoryKind>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Number of records, optionally for one owner.
    fn count(
        &self,
        owner: Option<&OwnerScope>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}

/// Cosine similarity in [-1, 1]; 0 for zero-length or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Brute-force in-process index. Exact search; used for tests and ephemeral runs.
pub struct InMemoryVectorIndex {
    dimension: usize,
    records: DashMap<String, MemoryRecord>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: DashMap::new(),
        }
    }

    fn matches(record: &MemoryRecord, owner: Option<&OwnerScope>, kind: Option<MemoryKind>) -> bool {
        owner.is_none_or(|o| &record.owner == o) && kind.is_none_or(|k| record.kind == k)
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn add(&self, record: &MemoryRecord) -> Result<(), RepositoryError> {
        if record.embedding.len() != self.dimension {
            return Err(RepositoryError::Query(format!(
                "vector has {} dimensions, index expects {}",
                record.embedding.len(),
                self.dimension
            )));
        }
        if self.records.contains_key(&record.id) {
            return Err(RepositoryError::Conflict(format!(
                "record '{}' already exists",
                record.id
            )));
        }
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn search(
        &self,
        owner: Option<&OwnerScope>,
        kind: Option<MemoryKind>,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RankedMemory>, RepositoryError> {
        let mut ranked: Vec<RankedMemory> = self
            .records
            .iter()
            .filter(|r| Self::matches(r.value(), owner, kind))
            .map(|r| RankedMemory {
                similarity: cosine_similarity(&r.value().embedding, embedding),
                record: r.value().clone(),
            })
            .collect();

        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn list(
        &self,
        owner: &OwnerScope,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        Ok(self
            .records
            .iter()
            .filter(|r| Self::matches(r.value(), Some(owner), kind))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn delete(
        &self,
        owner: &OwnerScope,
        kind: Option<MemoryKind>,
    ) -> Result<u64, RepositoryError> {
        let mut removed = 0u64;
        self.records.retain(|_, record| {
            let hit = Self::matches(record, Some(owner), kind);
            removed += u64::from(hit);
            !hit
        });
        Ok(removed)
    }

    async fn count(&self, owner: Option<&OwnerScope>) -> Result<u64, RepositoryError> {
        Ok(self
            .records
            .iter()
            .filter(|r| Self::matches(r.value(), owner, None))
            .count() as u64)
    }
}

/// Newest first; used when listing records without a query.
pub fn sort_newest_first(records: &mut [MemoryRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

/// Whether a record created at `created_at` is still live under `ttl`.
pub fn within_ttl(created_at: DateTime<Utc>, ttl: Option<chrono::Duration>, now: DateTime<Utc>) -> bool {
    ttl.is_none_or(|ttl| created_at + ttl > now)
}
