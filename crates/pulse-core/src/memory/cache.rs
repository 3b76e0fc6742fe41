//! Embedding cache: memoizes text → vector calls to the embedding capability.
//!
//! Keys are a SHA-256 of the embedding model name and the normalized text
//! (trimmed, lowercased, whitespace-collapsed). The normalized text is also
//! what gets embedded, so a cache hit returns exactly what a fresh call would.
//! The backing store is best-effort: read or write failures are logged and
//! the embedder is called directly.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use pulse_types::error::{EmbeddingError, RepositoryError};

use super::box_embedder::BoxEmbedder;

/// Backing store for cached embeddings with per-entry expiry.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait EmbeddingCacheStore: Send + Sync {
    /// Fetch a cached vector. Expired entries are misses.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<f32>>, RepositoryError>> + Send;

    /// Store a vector that expires after `ttl`.
    fn put(
        &self,
        key: &str,
        vector: &[f32],
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

/// In-process cache store. Entries expire lazily on read.
#[derive(Default)]
pub struct InMemoryEmbeddingCacheStore {
    entries: DashMap<String, (Vec<f32>, DateTime<Utc>)>,
}

impl InMemoryEmbeddingCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EmbeddingCacheStore for InMemoryEmbeddingCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<f32>>, RepositoryError> {
        let now = Utc::now();
        let hit = self.entries.get(key).and_then(|entry| {
            let (vector, expires_at) = entry.value();
            (*expires_at > now).then(|| vector.clone())
        });
        if hit.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(hit)
    }

    async fn put(&self, key: &str, vector: &[f32], ttl: Duration) -> Result<(), RepositoryError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| RepositoryError::Query(format!("invalid ttl: {e}")))?;
        self.entries
            .insert(key.to_string(), (vector.to_vec(), Utc::now() + ttl));
        Ok(())
    }
}

/// Collapse whitespace, trim and lowercase text before hashing and embedding.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cache key for `text` under embedding model `model`.
pub fn cache_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_text(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache-first front end to the embedding capability.
pub struct EmbeddingCache<C> {
    embedder: BoxEmbedder,
    store: C,
    ttl: Duration,
}

impl<C: EmbeddingCacheStore> EmbeddingCache<C> {
    pub fn new(embedder: BoxEmbedder, store: C, ttl: Duration) -> Self {
        Self {
            embedder,
            store,
            ttl,
        }
    }

    /// Dimensionality every returned vector has.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Embed `text`, reading through the cache.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.get_or_compute(text).await
    }

    /// Return the cached vector for `text`, or compute, validate and cache it.
    ///
    /// The embedding capability is retried once before giving up with
    /// [`EmbeddingError::Unavailable`].
    pub async fn get_or_compute(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let key = cache_key(self.embedder.model_name(), text);
        let expected = self.embedder.dimension();

        match self.store.get(&key).await {
            Ok(Some(vector)) if vector.len() == expected => {
                debug!(key = %&key[..12], "Embedding cache hit");
                return Ok(vector);
            }
            Ok(Some(vector)) => {
                debug!(
                    expected,
                    actual = vector.len(),
                    "Ignoring cached embedding with stale dimension"
                );
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Embedding cache read failed, bypassing cache"),
        }

        let vector = self.compute(&normalize_text(text)).await?;
        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        if let Err(e) = self.store.put(&key, &vector, self.ttl).await {
            warn!(error = %e, "Embedding cache write failed");
        }

        Ok(vector)
    }

    async fn compute(&self, normalized: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = vec![normalized.to_string()];
        let mut last_error = String::new();

        for attempt in 0..2u8 {
            match self.embedder.embed(&input).await {
                Ok(mut vectors) if !vectors.is_empty() => return Ok(vectors.swap_remove(0)),
                Ok(_) => last_error = "embedder returned no vectors".to_string(),
                Err(e) => last_error = e.to_string(),
            }
            debug!(attempt, error = %last_error, "Embedding call failed");
        }

        warn!(error = %last_error, "Embedding capability unavailable after retry");
        Err(EmbeddingError::Unavailable(last_error))
    }
}
