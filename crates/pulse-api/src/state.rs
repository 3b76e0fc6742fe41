//! Application state wiring the assistant over the on-disk stores.
//!
//! The core is generic over its store ports; `AppState` pins them to the
//! SQLite and LanceDB implementations from `pulse-infra`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use pulse_core::agent::assistant::Assistant;
use pulse_core::agent::context::AssistantContext;
use pulse_core::agent::health::BoxHealthDataSource;
use pulse_core::llm::box_provider::BoxModelProvider;
use pulse_core::llm::token_accountant::TokenAccountant;
use pulse_core::memory::box_embedder::BoxEmbedder;
use pulse_core::memory::cache::EmbeddingCache;
use pulse_core::memory::extractor::{FactExtractor, LlmFactExtractor};
use pulse_core::memory::store::{MemoryStore, StoreOptions};
use pulse_infra::config::{load_config, resolve_data_dir};
use pulse_infra::embedding::HttpEmbedder;
use pulse_infra::health::HttpHealthDataSource;
use pulse_infra::llm::openai_compat::OpenAiCompatProvider;
use pulse_infra::sqlite::embedding_cache::SqliteEmbeddingCacheStore;
use pulse_infra::sqlite::pool::{DatabasePool, database_url};
use pulse_infra::sqlite::short_term::SqliteShortTermStore;
use pulse_infra::vector::lance::LanceVectorStore;
use pulse_infra::vector::memory::LanceMemoryIndex;
use pulse_types::config::AssistantVariant;
use pulse_types::memory::MemoryTier;

/// The assistant pinned to the infra implementations.
pub type ConcreteAssistant = Assistant<SqliteShortTermStore, LanceMemoryIndex, SqliteEmbeddingCacheStore>;

pub type ConcreteContext = AssistantContext<SqliteShortTermStore, LanceMemoryIndex, SqliteEmbeddingCacheStore>;

/// Overrides taken from the command line.
#[derive(Debug, Default)]
pub struct InitOptions {
    pub data_dir: Option<PathBuf>,
    pub memoryless: bool,
    pub llm_extraction: bool,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub assistant: ConcreteAssistant,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load config, open the stores and build the assistant context.
    pub async fn init(options: InitOptions) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir(options.data_dir.as_deref());
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let mut config = load_config(&data_dir).await;
        if options.memoryless {
            config.agent.variant = AssistantVariant::Memoryless;
        }

        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("Failed to open database")?;

        let model = Arc::new(BoxModelProvider::new(OpenAiCompatProvider::from_config(
            &config.model,
        )?));

        let embeddings = Arc::new(EmbeddingCache::new(
            BoxEmbedder::new(HttpEmbedder::from_config(&config.embedding)?),
            SqliteEmbeddingCacheStore::new(db_pool.clone()),
            Duration::from_secs(config.memory.embedding_cache_ttl_secs),
        ));

        let vectors = LanceVectorStore::in_data_dir(&data_dir)
            .await
            .context("Failed to open vector store")?;
        let store_options = StoreOptions::from_config(&config.memory);
        let dimension = config.embedding.dimension;

        let episodic = MemoryStore::new(
            MemoryTier::Episodic,
            LanceMemoryIndex::open(&vectors, MemoryTier::Episodic, dimension).await?,
            Arc::clone(&embeddings),
            store_options,
        )?;
        let procedural = MemoryStore::new(
            MemoryTier::Procedural,
            LanceMemoryIndex::open(&vectors, MemoryTier::Procedural, dimension).await?,
            Arc::clone(&embeddings),
            store_options,
        )?;

        let extractor = if options.llm_extraction {
            FactExtractor::Llm(LlmFactExtractor::new(
                Arc::clone(&model),
                config.model.model.clone(),
                Duration::from_secs(config.agent.model_timeout_secs),
            ))
        } else {
            FactExtractor::heuristic()
        };

        let short_term = SqliteShortTermStore::new(
            db_pool,
            chrono::Duration::seconds(i64::try_from(config.memory.short_term_ttl_secs).unwrap_or(i64::MAX)),
        );

        info!(
            data_dir = %data_dir.display(),
            variant = %config.agent.variant,
            model = %config.model.model,
            embedding_model = %config.embedding.model,
            "Assistant context ready"
        );

        let ctx = AssistantContext {
            model,
            short_term,
            episodic,
            procedural,
            health: BoxHealthDataSource::new(HttpHealthDataSource::from_config(&config.health)?),
            extractor,
            accountant: TokenAccountant::estimating(config.memory.trim_threshold),
            config,
        };

        Ok(Self {
            assistant: Assistant::new(ctx),
            data_dir,
        })
    }

    pub fn context(&self) -> &ConcreteContext {
        self.assistant.context()
    }
}
