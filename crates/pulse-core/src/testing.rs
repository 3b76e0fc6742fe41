//! Test doubles for the core ports.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use pulse_types::config::PulseConfig;
use pulse_types::error::{CapabilityError, EmbeddingError, RepositoryError};
use pulse_types::llm::{CompletionRequest, CompletionResponse, LlmError, ModelReply, ToolCall, Usage};
use pulse_types::memory::MemoryTier;

use crate::agent::capability::{HealthMetricsArgs, SleepArgs, WorkoutArgs};
use crate::agent::context::AssistantContext;
use crate::agent::health::{BoxHealthDataSource, HealthDataSource};
use crate::chat::short_term::InMemoryShortTermStore;
use crate::llm::box_provider::BoxModelProvider;
use crate::llm::provider::ModelProvider;
use crate::llm::token_accountant::TokenAccountant;
use crate::memory::box_embedder::BoxEmbedder;
use crate::memory::cache::{EmbeddingCache, EmbeddingCacheStore, InMemoryEmbeddingCacheStore};
use crate::memory::embedder::Embedder;
use crate::memory::extractor::FactExtractor;
use crate::memory::store::{MemoryStore, StoreOptions};
use crate::memory::vector::InMemoryVectorIndex;

pub const TEST_DIMENSION: usize = 64;

pub type TestContext =
    AssistantContext<InMemoryShortTermStore, InMemoryVectorIndex, InMemoryEmbeddingCacheStore>;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptState {
    replies: VecDeque<Result<ModelReply, LlmError>>,
    requests: Vec<CompletionRequest>,
}

/// Replays a fixed list of replies, one per call, and records every request.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    state: Arc<Mutex<ScriptState>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ModelReply, LlmError>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                replies: replies.into(),
                requests: Vec::new(),
            })),
            ..Self::default()
        }
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl ModelProvider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().requests.push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.state.lock().unwrap().replies.pop_front();
        let reply = next.unwrap_or_else(|| {
            Err(LlmError::Provider {
                message: "script exhausted".to_string(),
            })
        })?;
        Ok(CompletionResponse {
            id: format!("resp_{n}"),
            model: request.model.clone(),
            reply,
            usage: Usage::default(),
        })
    }
}

/// A model that must never be called.
pub struct PanickingModel;

impl ModelProvider for PanickingModel {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        panic!("the model must not be called");
    }
}

static CALL_SEQ: AtomicU64 = AtomicU64::new(0);

pub fn tool_call(name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: format!("call_{}", CALL_SEQ.fetch_add(1, Ordering::Relaxed)),
        name: name.to_string(),
        arguments,
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

/// Deterministic bag-of-words embedder: hashed token counts, L2-normalized.
///
/// Texts sharing words get high cosine similarity, which is enough to
/// exercise paraphrase recall.
#[derive(Clone)]
pub struct HashEmbedder {
    dimension: usize,
    declared: usize,
    calls: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            declared: dimension,
            calls: Arc::new(AtomicUsize::new(0)),
            failures_left: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next `n` calls.
    pub fn failing_times(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Report a dimension different from what is actually produced.
    pub fn declaring_dimension(mut self, declared: usize) -> Self {
        self.declared = declared;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in token.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            v[(hash % self.dimension as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EmbeddingError::Unavailable("simulated outage".to_string()));
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "hash-bow"
    }

    fn dimension(&self) -> usize {
        self.declared
    }
}

/// A cache backend that is always down.
pub struct FailingCacheStore;

impl EmbeddingCacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<f32>>, RepositoryError> {
        Err(RepositoryError::Connection)
    }

    async fn put(&self, _key: &str, _vector: &[f32], _ttl: Duration) -> Result<(), RepositoryError> {
        Err(RepositoryError::Connection)
    }
}

fn shared_cache(embedder: HashEmbedder) -> Arc<EmbeddingCache<InMemoryEmbeddingCacheStore>> {
    Arc::new(EmbeddingCache::new(
        BoxEmbedder::new(embedder),
        InMemoryEmbeddingCacheStore::new(),
        Duration::from_secs(7 * 24 * 3600),
    ))
}

fn store(
    tier: MemoryTier,
    embeddings: Arc<EmbeddingCache<InMemoryEmbeddingCacheStore>>,
) -> MemoryStore<InMemoryVectorIndex, InMemoryEmbeddingCacheStore> {
    let dimension = embeddings.dimension();
    MemoryStore::new(
        tier,
        InMemoryVectorIndex::new(dimension),
        embeddings,
        StoreOptions::default(),
    )
    .unwrap()
}

pub fn episodic_store(embedder: HashEmbedder) -> MemoryStore<InMemoryVectorIndex, InMemoryEmbeddingCacheStore> {
    store(MemoryTier::Episodic, shared_cache(embedder))
}

pub fn procedural_store(embedder: HashEmbedder) -> MemoryStore<InMemoryVectorIndex, InMemoryEmbeddingCacheStore> {
    store(MemoryTier::Procedural, shared_cache(embedder))
}

// ---------------------------------------------------------------------------
// Health data
// ---------------------------------------------------------------------------

/// Returns canned payloads for every domain capability.
pub struct StaticHealthSource {
    metrics: serde_json::Value,
    sleep: serde_json::Value,
    workouts: serde_json::Value,
    delay: Option<Duration>,
}

impl StaticHealthSource {
    pub fn heart_rate(average: u32) -> Self {
        Self {
            metrics: json!({"average": average, "unit": "bpm"}),
            sleep: json!({"average_hours": 7.2, "nights": [{"date": "2026-03-01", "hours": 7.2}]}),
            workouts: json!({"workouts": [{"type": "running", "distance_km": 5.0, "date": "2026-03-03"}]}),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn respond(&self, value: &serde_json::Value) -> Result<serde_json::Value, CapabilityError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(value.clone())
    }
}

impl HealthDataSource for StaticHealthSource {
    async fn health_metrics(
        &self,
        _user_id: &str,
        _args: &HealthMetricsArgs,
    ) -> Result<serde_json::Value, CapabilityError> {
        self.respond(&self.metrics).await
    }

    async fn sleep_data(&self, _user_id: &str, _args: &SleepArgs) -> Result<serde_json::Value, CapabilityError> {
        self.respond(&self.sleep).await
    }

    async fn workouts(&self, _user_id: &str, _args: &WorkoutArgs) -> Result<serde_json::Value, CapabilityError> {
        self.respond(&self.workouts).await
    }
}

/// A health service that is always down.
pub struct FailingHealthSource;

fn unavailable(name: &str) -> CapabilityError {
    CapabilityError::Execution {
        name: name.to_string(),
        message: "health service returned HTTP 503".to_string(),
    }
}

impl HealthDataSource for FailingHealthSource {
    async fn health_metrics(
        &self,
        _user_id: &str,
        _args: &HealthMetricsArgs,
    ) -> Result<serde_json::Value, CapabilityError> {
        Err(unavailable("get_health_metrics"))
    }

    async fn sleep_data(&self, _user_id: &str, _args: &SleepArgs) -> Result<serde_json::Value, CapabilityError> {
        Err(unavailable("get_sleep_data"))
    }

    async fn workouts(&self, _user_id: &str, _args: &WorkoutArgs) -> Result<serde_json::Value, CapabilityError> {
        Err(unavailable("get_workouts"))
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// A fully in-memory assistant context with default configuration.
pub fn test_context<M, H>(model: M, health: H) -> TestContext
where
    M: ModelProvider + 'static,
    H: HealthDataSource + 'static,
{
    let config = PulseConfig::default();
    let embeddings = shared_cache(HashEmbedder::new(TEST_DIMENSION));
    let options = StoreOptions::from_config(&config.memory);

    let memory_store = |tier| {
        MemoryStore::new(
            tier,
            InMemoryVectorIndex::new(TEST_DIMENSION),
            embeddings.clone(),
            options,
        )
        .unwrap()
    };

    AssistantContext {
        model: Arc::new(BoxModelProvider::new(model)),
        short_term: InMemoryShortTermStore::new(chrono::Duration::seconds(
            config.memory.short_term_ttl_secs as i64,
        )),
        episodic: memory_store(MemoryTier::Episodic),
        procedural: memory_store(MemoryTier::Procedural),
        health: BoxHealthDataSource::new(health),
        extractor: FactExtractor::heuristic(),
        accountant: TokenAccountant::estimating(config.memory.trim_threshold),
        config,
    }
}
