//! The explicitly constructed dependency bundle for running turns.
//!
//! Built once at startup and shared by reference; there is no ambient global
//! state. Both long-term stores share a single embedding cache.

use std::sync::Arc;
use std::time::Duration;

use pulse_types::config::{AssistantVariant, PulseConfig};

use crate::chat::short_term::ShortTermStore;
use crate::llm::box_provider::BoxModelProvider;
use crate::llm::token_accountant::TokenAccountant;
use crate::memory::cache::EmbeddingCacheStore;
use crate::memory::extractor::FactExtractor;
use crate::memory::store::MemoryStore;
use crate::memory::vector::VectorIndex;

use super::health::BoxHealthDataSource;

/// Everything a turn needs, generic over the storage adapters.
pub struct AssistantContext<S, V, C> {
    pub model: Arc<BoxModelProvider>,
    pub short_term: S,
    pub episodic: MemoryStore<V, C>,
    pub procedural: MemoryStore<V, C>,
    pub health: BoxHealthDataSource,
    pub extractor: FactExtractor,
    pub accountant: TokenAccountant,
    pub config: PulseConfig,
}

impl<S, V, C> AssistantContext<S, V, C>
where
    S: ShortTermStore,
    V: VectorIndex,
    C: EmbeddingCacheStore,
{
    pub fn variant(&self) -> AssistantVariant {
        self.config.agent.variant
    }

    /// Model calls allowed in one turn for the configured variant.
    pub fn iteration_limit(&self) -> u32 {
        self.config.agent.iteration_limit(self.variant())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.config.agent.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.config.agent.tool_timeout_secs)
    }
}
