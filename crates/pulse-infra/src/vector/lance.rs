//! The LanceDB connection that holds both memory tiers.
//!
//! Tables are created lazily on first open. A tier table remembers the
//! vector width it was created with; reopening it with an embedder of a
//! different width is refused instead of mixing dimensions in one index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pulse_types::error::RepositoryError;
use pulse_types::memory::MemoryTier;

use super::schema::{memory_schema, table_name, vector_type};

pub struct LanceVectorStore {
    db: lancedb::Connection,
}

impl LanceVectorStore {
    /// Connect to (creating if needed) the LanceDB directory at `root`.
    pub async fn new(root: PathBuf) -> Result<Self, lancedb::Error> {
        std::fs::create_dir_all(&root).map_err(|e| lancedb::Error::CreateDir {
            path: root.display().to_string(),
            source: e,
        })?;
        let uri = root.to_str().ok_or_else(|| lancedb::Error::InvalidInput {
            message: format!("vector store path is not UTF-8: {}", root.display()),
        })?;

        let db = lancedb::connect(uri).execute().await?;
        Ok(Self { db })
    }

    /// `{data_dir}/vector_store`.
    pub async fn in_data_dir(data_dir: &Path) -> Result<Self, lancedb::Error> {
        Self::new(data_dir.join("vector_store")).await
    }

    /// The table backing `tier`, created empty for `dimension`-wide vectors
    /// when missing.
    pub async fn tier_table(&self, tier: MemoryTier, dimension: usize) -> Result<lancedb::Table, RepositoryError> {
        let width = i32::try_from(dimension)
            .map_err(|_| RepositoryError::Query(format!("dimension {dimension} out of range")))?;
        let name = table_name(tier);

        let table = match self.db.open_table(name).execute().await {
            Ok(table) => table,
            Err(lancedb::Error::TableNotFound { .. }) => {
                tracing::info!(%tier, dimension, "Creating memory table");
                self.db
                    .create_empty_table(name, Arc::new(memory_schema(width)))
                    .execute()
                    .await
                    .map_err(|e| RepositoryError::Query(format!("Failed to create {name}: {e}")))?
            }
            Err(e) => return Err(RepositoryError::Query(format!("Failed to open {name}: {e}"))),
        };

        let schema = table
            .schema()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to read {name} schema: {e}")))?;
        let stored = schema
            .field_with_name("vector")
            .map_err(|e| RepositoryError::Query(format!("{name} has no vector column: {e}")))?;
        if stored.data_type() != &vector_type(width) {
            return Err(RepositoryError::Conflict(format!(
                "{name} holds {:?} vectors but the embedder produces {dimension}",
                stored.data_type()
            )));
        }
        Ok(table)
    }
}
