//! Episodic and procedural memory stores.
//!
//! `MemoryStore` is one contract with two instantiations, selected by
//! [`MemoryTier`]. Writes compute the embedding first and only then persist,
//! so a record without a vector is never observable. Reads rank by similarity,
//! breaking near-ties by outcome score and then by recency, so the newest of
//! two contradicting records wins.

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use pulse_types::config::MemoryConfig;
use pulse_types::error::MemoryError;
use pulse_types::memory::{
    MemoryKind, MemoryRecord, MemoryTier, NewMemory, OwnerScope, RankedMemory,
};

use super::cache::{EmbeddingCache, EmbeddingCacheStore};
use super::vector::{VectorIndex, sort_newest_first, within_ttl};

/// Process-wide sequence that disambiguates records written at the same instant.
static RECORD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Similarities closer than this are treated as ties.
const SIMILARITY_RESOLUTION: f32 = 1e-6;

/// Read-side tuning for a store.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Hits below this cosine similarity are dropped.
    pub similarity_floor: f32,
    /// `None` = records never expire.
    pub record_ttl: Option<chrono::Duration>,
}

impl StoreOptions {
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            similarity_floor: config.similarity_floor,
            record_ttl: config
                .record_ttl_secs
                .and_then(|secs| chrono::Duration::try_seconds(secs as i64)),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            similarity_floor: 0.25,
            record_ttl: None,
        }
    }
}

/// Vector-indexed long-term memory for one tier.
pub struct MemoryStore<V, C> {
    tier: MemoryTier,
    index: V,
    embeddings: Arc<EmbeddingCache<C>>,
    options: StoreOptions,
}

impl<V: VectorIndex, C: EmbeddingCacheStore> MemoryStore<V, C> {
    /// Create a store. Fails if the index and embedder disagree on dimension.
    pub fn new(
        tier: MemoryTier,
        index: V,
        embeddings: Arc<EmbeddingCache<C>>,
        options: StoreOptions,
    ) -> Result<Self, MemoryError> {
        if index.dimension() != embeddings.dimension() {
            return Err(MemoryError::DimensionMismatch {
                expected: index.dimension(),
                actual: embeddings.dimension(),
            });
        }
        Ok(Self {
            tier,
            index,
            embeddings,
            options,
        })
    }

    pub fn tier(&self) -> MemoryTier {
        self.tier
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    /// Embed and persist a new record.
    pub async fn write(&self, draft: NewMemory) -> Result<MemoryRecord, MemoryError> {
        self.write_at(draft, Utc::now()).await
    }

    /// Embed and persist a new record with an explicit creation time.
    pub async fn write_at(
        &self,
        draft: NewMemory,
        created_at: DateTime<Utc>,
    ) -> Result<MemoryRecord, MemoryError> {
        if draft.kind.tier() != self.tier {
            return Err(MemoryError::InvalidRecord(format!(
                "{} record cannot be written to the {} store",
                draft.kind, self.tier
            )));
        }
        let description = draft.description.trim();
        if description.is_empty() {
            return Err(MemoryError::InvalidRecord("empty description".to_string()));
        }

        let embedding = self.embeddings.get_or_compute(description).await?;

        let record = MemoryRecord {
            id: record_id(&draft.owner, created_at),
            owner: draft.owner,
            kind: draft.kind,
            description: description.to_string(),
            embedding,
            metadata: draft.metadata,
            created_at,
        };
        self.index.add(&record).await?;

        info!(
            tier = %self.tier,
            kind = %record.kind,
            owner = %record.owner,
            id = %record.id,
            "Memory record written"
        );
        Ok(record)
    }

    /// Similarity search within `owner` (or across all owners when `None`).
    pub async fn search(
        &self,
        query: &str,
        owner: Option<&OwnerScope>,
        top_k: usize,
    ) -> Result<Vec<RankedMemory>, MemoryError> {
        self.search_kind(query, owner, None, top_k).await
    }

    /// Similarity search restricted to one record kind.
    pub async fn search_kind(
        &self,
        query: &str,
        owner: Option<&OwnerScope>,
        kind: Option<MemoryKind>,
        top_k: usize,
    ) -> Result<Vec<RankedMemory>, MemoryError> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embeddings.get_or_compute(query).await?;
        // Over-fetch so floor/TTL filtering and tie re-ranking still fill top_k.
        let candidates = self
            .index
            .search(owner, kind, &embedding, top_k * 2 + 4)
            .await?;

        let now = Utc::now();
        let mut ranked: Vec<RankedMemory> = candidates
            .into_iter()
            .filter(|hit| hit.similarity >= self.options.similarity_floor)
            .filter(|hit| within_ttl(hit.record.created_at, self.options.record_ttl, now))
            .collect();
        rank(&mut ranked);
        ranked.truncate(top_k);

        debug!(
            tier = %self.tier,
            hits = ranked.len(),
            top_similarity = ranked.first().map(|h| h.similarity),
            "Memory search"
        );
        Ok(ranked)
    }

    /// All live records of an owner, newest first.
    pub async fn list(
        &self,
        owner: &OwnerScope,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let now = Utc::now();
        let mut records: Vec<MemoryRecord> = self
            .index
            .list(owner, kind)
            .await?
            .into_iter()
            .filter(|r| within_ttl(r.created_at, self.options.record_ttl, now))
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// A user's goals, newest first.
    pub async fn latest_goals(&self, user_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.list(&OwnerScope::user(user_id), Some(MemoryKind::Goal))
            .await
    }

    pub async fn delete(
        &self,
        owner: &OwnerScope,
        kind: Option<MemoryKind>,
    ) -> Result<u64, MemoryError> {
        let removed = self.index.delete(owner, kind).await?;
        info!(tier = %self.tier, owner = %owner, removed, "Memory records deleted");
        Ok(removed)
    }

    pub async fn count(&self, owner: Option<&OwnerScope>) -> Result<u64, MemoryError> {
        Ok(self.index.count(owner).await?)
    }
}

/// Owner-scoped, collision-free record id: `{owner}:{micros}:{seq}`.
pub fn record_id(owner: &OwnerScope, created_at: DateTime<Utc>) -> String {
    let seq = RECORD_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
    format!("{owner}:{}:{seq}", created_at.timestamp_micros())
}

/// Sort hits: similarity desc, then outcome score desc, then newest first.
fn rank(hits: &mut [RankedMemory]) {
    hits.sort_by(|a, b| {
        similarity_bucket(b.similarity)
            .cmp(&similarity_bucket(a.similarity))
            .then_with(|| compare_scores(b.record.outcome_score(), a.record.outcome_score()))
            .then_with(|| b.record.created_at.cmp(&a.record.created_at))
            .then_with(|| b.record.id.cmp(&a.record.id))
    });
}

fn similarity_bucket(similarity: f32) -> i64 {
    (similarity / SIMILARITY_RESOLUTION).round() as i64
}

fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.unwrap_or(f64::NEG_INFINITY)
        .total_cmp(&b.unwrap_or(f64::NEG_INFINITY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::box_embedder::BoxEmbedder;
    use crate::memory::cache::InMemoryEmbeddingCacheStore;
    use crate::memory::vector::InMemoryVectorIndex;
    use crate::testing::{HashEmbedder, TEST_DIMENSION, episodic_store, procedural_store};
    use pulse_types::memory::PatternMetadata;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_then_search_paraphrase() {
        let store = episodic_store(HashEmbedder::new(TEST_DIMENSION));
        let written = store
            .write(NewMemory::fact("alice", "My resting heart rate is usually around 58 bpm"))
            .await
            .unwrap();
        store
            .write(NewMemory::fact("alice", "I prefer swimming over cycling on weekends"))
            .await
            .unwrap();

        let hits = store
            .search(
                "what is my usual resting heart rate",
                Some(&OwnerScope::user("alice")),
                3,
            )
            .await
            .unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].record.id, written.id);
        assert!(hits[0].similarity >= 0.25);
    }

    #[tokio::test]
    async fn test_search_exact_text_round_trip() {
        let store = episodic_store(HashEmbedder::new(TEST_DIMENSION));
        let text = "I sleep about 7 hours on weeknights";
        let written = store.write(NewMemory::fact("u1", text)).await.unwrap();

        let hits = store
            .search(text, Some(&OwnerScope::user("u1")), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, written.id);
        assert!(hits[0].similarity > 0.99);
    }

    #[tokio::test]
    async fn test_search_empty_index_returns_empty() {
        let store = episodic_store(HashEmbedder::new(TEST_DIMENSION));
        let hits = store
            .search("anything at all", Some(&OwnerScope::user("nobody")), 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_does_not_leak_across_users() {
        let store = episodic_store(HashEmbedder::new(TEST_DIMENSION));
        store
            .write(NewMemory::goal("alice", "walk 10000 steps every day"))
            .await
            .unwrap();

        let hits = store
            .search("walk 10000 steps every day", Some(&OwnerScope::user("bob")), 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_discards_record() {
        let store = episodic_store(HashEmbedder::new(TEST_DIMENSION).failing_times(2));
        let err = store
            .write(NewMemory::fact("u", "My weight is 70 kg"))
            .await
            .unwrap_err();

        assert!(matches!(err, MemoryError::EmbeddingUnavailable(_)));
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_colliding_timestamps_for_different_users_both_persist() {
        let store = Arc::new(episodic_store(HashEmbedder::new(TEST_DIMENSION)));
        let at = Utc::now();

        let (a, b) = tokio::join!(
            store.write_at(NewMemory::goal("alice", "run 3 times per week"), at),
            store.write_at(NewMemory::goal("bob", "run 3 times per week"), at),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.id, b.id);
        assert_eq!(store.count(None).await.unwrap(), 2);
        assert_eq!(store.latest_goals("alice").await.unwrap().len(), 1);
        assert_eq!(store.latest_goals("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_user_same_timestamp_gets_distinct_ids() {
        let store = episodic_store(HashEmbedder::new(TEST_DIMENSION));
        let at = Utc::now();
        let a = store
            .write_at(NewMemory::fact("u", "I drink 2 liters of water daily"), at)
            .await
            .unwrap();
        let b = store
            .write_at(NewMemory::fact("u", "I drink 2 liters of water daily"), at)
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.count(Some(&OwnerScope::user("u"))).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_identical_matches_prefer_most_recent() {
        let store = episodic_store(HashEmbedder::new(TEST_DIMENSION));
        let now = Utc::now();
        let older = store
            .write_at(
                NewMemory::goal("u", "run 5 km under 30 minutes"),
                now - chrono::Duration::days(30),
            )
            .await
            .unwrap();
        let newer = store
            .write_at(NewMemory::goal("u", "run 5 km under 30 minutes"), now)
            .await
            .unwrap();

        let hits = store
            .search("run 5 km under 30 minutes", Some(&OwnerScope::user("u")), 2)
            .await
            .unwrap();
        assert_eq!(hits[0].record.id, newer.id);
        assert_eq!(hits[1].record.id, older.id);

        let goals = store.latest_goals("u").await.unwrap();
        assert_eq!(goals[0].id, newer.id);
    }

    #[tokio::test]
    async fn test_procedural_ties_prefer_higher_score() {
        let store = procedural_store(HashEmbedder::new(TEST_DIMENSION));
        let now = Utc::now();
        let low = PatternMetadata {
            tools: vec!["get_health_metrics".into(), "get_health_metrics".into()],
            score: 0.75,
        };
        let high = PatternMetadata {
            tools: vec!["get_health_metrics".into()],
            score: 0.95,
        };
        store
            .write_at(NewMemory::pattern("average heart rate last week", &low), now)
            .await
            .unwrap();
        let best = store
            .write_at(
                NewMemory::pattern("average heart rate last week", &high),
                now - chrono::Duration::hours(1),
            )
            .await
            .unwrap();

        let hits = store
            .search("average heart rate last week", None, 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, best.id);
    }

    #[tokio::test]
    async fn test_wrong_tier_rejected() {
        let store = procedural_store(HashEmbedder::new(TEST_DIMENSION));
        let err = store
            .write(NewMemory::fact("u", "I am 35 years old"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_expired_records_hidden_from_reads() {
        let embeddings = Arc::new(EmbeddingCache::new(
            BoxEmbedder::new(HashEmbedder::new(TEST_DIMENSION)),
            InMemoryEmbeddingCacheStore::new(),
            Duration::from_secs(60),
        ));
        let store = MemoryStore::new(
            MemoryTier::Episodic,
            InMemoryVectorIndex::new(TEST_DIMENSION),
            embeddings,
            StoreOptions {
                similarity_floor: 0.0,
                record_ttl: Some(chrono::Duration::days(1)),
            },
        )
        .unwrap();
        store
            .write_at(
                NewMemory::fact("u", "I had knee surgery in 2019"),
                Utc::now() - chrono::Duration::days(2),
            )
            .await
            .unwrap();

        let owner = OwnerScope::user("u");
        assert!(store.list(&owner, None).await.unwrap().is_empty());
        assert!(
            store
                .search("knee surgery", Some(&owner), 5)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_store_rejects_dimension_disagreement() {
        let embeddings = Arc::new(EmbeddingCache::new(
            BoxEmbedder::new(HashEmbedder::new(8)),
            InMemoryEmbeddingCacheStore::new(),
            Duration::from_secs(60),
        ));
        let result = MemoryStore::new(
            MemoryTier::Episodic,
            InMemoryVectorIndex::new(16),
            embeddings,
            StoreOptions::default(),
        );
        assert!(matches!(
            result,
            Err(MemoryError::DimensionMismatch {
                expected: 16,
                actual: 8
            })
        ));
    }
}
