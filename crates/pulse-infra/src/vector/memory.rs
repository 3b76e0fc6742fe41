//! LanceDB-backed `VectorIndex` for one memory tier.
//!
//! Each tier lives in its own table (`episodic_memory`, `procedural_memory`).
//! Owner and kind filters are pushed down to LanceDB with `only_if`, and
//! search uses cosine distance, reported back as `similarity = 1 - distance`.

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};

use pulse_core::memory::vector::VectorIndex;
use pulse_types::error::RepositoryError;
use pulse_types::memory::{MemoryKind, MemoryRecord, MemoryTier, OwnerScope, RankedMemory};

use super::lance::LanceVectorStore;
use super::schema::memory_schema;

/// LanceDB table for one memory tier.
pub struct LanceMemoryIndex {
    table: lancedb::Table,
    tier: MemoryTier,
    dimension: usize,
}

impl LanceMemoryIndex {
    /// Open (creating if needed) the table for `tier`.
    ///
    /// Fails if an existing table was built for a different vector width.
    pub async fn open(
        store: &LanceVectorStore,
        tier: MemoryTier,
        dimension: usize,
    ) -> Result<Self, RepositoryError> {
        Ok(Self {
            table: store.tier_table(tier, dimension).await?,
            tier,
            dimension,
        })
    }

    pub fn tier(&self) -> MemoryTier {
        self.tier
    }

    fn build_record_batch(&self, record: &MemoryRecord) -> Result<RecordBatch, RepositoryError> {
        let width = self.dimension as i32;
        let schema = Arc::new(memory_schema(width));

        let metadata = if record.metadata.is_null() {
            None
        } else {
            Some(record.metadata.to_string())
        };

        let values = Float32Array::from(record.embedding.clone());
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::new(field, width, Arc::new(values), None);

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![record.id.clone()])),
                Arc::new(StringArray::from(vec![record.owner.to_string()])),
                Arc::new(StringArray::from(vec![record.kind.to_string()])),
                Arc::new(StringArray::from(vec![record.description.clone()])),
                Arc::new(StringArray::from(vec![metadata])),
                Arc::new(StringArray::from(vec![
                    record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                ])),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| RepositoryError::Query(format!("Failed to build record batch: {e}")))
    }

    async fn collect(
        &self,
        stream: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<RecordBatch>, RepositoryError> {
        stream
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect {} results: {e}", self.tier)))
    }
}

/// SQL-style filter for the owner/kind selection, if any.
fn filter_for(owner: Option<&OwnerScope>, kind: Option<MemoryKind>) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(owner) = owner {
        clauses.push(format!("owner = '{}'", escape(&owner.to_string())));
    }
    if let Some(kind) = kind {
        clauses.push(format!("kind = '{kind}'"));
    }
    (!clauses.is_empty()).then(|| clauses.join(" AND "))
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RepositoryError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RepositoryError::Query(format!("missing or mistyped column '{name}'")))
}

/// Parse Arrow rows back into records, embeddings included.
fn batch_to_records(batch: &RecordBatch) -> Result<Vec<MemoryRecord>, RepositoryError> {
    let ids = string_column(batch, "id")?;
    let owners = string_column(batch, "owner")?;
    let kinds = string_column(batch, "kind")?;
    let descriptions = string_column(batch, "description")?;
    let metadata = string_column(batch, "metadata")?;
    let created = string_column(batch, "created_at")?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let owner: OwnerScope = owners.value(i).parse().map_err(RepositoryError::Query)?;
        let kind: MemoryKind = kinds.value(i).parse().map_err(RepositoryError::Query)?;
        let metadata = if metadata.is_null(i) {
            serde_json::Value::Null
        } else {
            serde_json::from_str(metadata.value(i))
                .map_err(|e| RepositoryError::Query(format!("invalid metadata: {e}")))?
        };
        let created_at = DateTime::parse_from_rfc3339(created.value(i))
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))?;
        let embedding = vectors
            .map(|v| v.value(i))
            .and_then(|values| {
                values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .map(|f| f.values().to_vec())
            })
            .unwrap_or_default();

        records.push(MemoryRecord {
            id: ids.value(i).to_string(),
            owner,
            kind,
            description: descriptions.value(i).to_string(),
            embedding,
            metadata,
            created_at,
        });
    }
    Ok(records)
}

impl VectorIndex for LanceMemoryIndex {
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
        let existing = self
            .table
            .count_rows(Some(format!("id = '{}'", escape(&record.id))))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to check record id: {e}")))?;
        if existing > 0 {
            return Err(RepositoryError::Conflict(format!(
                "record '{}' already exists",
                record.id
            )));
        }

        let batch = self.build_record_batch(record)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to add {} record: {e}", self.tier)))?;
        Ok(())
    }

    async fn search(
        &self,
        owner: Option<&OwnerScope>,
        kind: Option<MemoryKind>,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RankedMemory>, RepositoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let filter = filter_for(owner, kind);
        let candidates = self
            .table
            .count_rows(filter.clone())
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))?;
        if candidates == 0 {
            return Ok(Vec::new());
        }

        let mut query = self
            .table
            .vector_search(embedding)
            .map_err(|e| RepositoryError::Query(format!("Vector search setup failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(limit);
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }

        let results = query
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Vector search failed: {e}")))?;
        let batches = self.collect(results).await?;

        let mut ranked = Vec::new();
        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            // The _distance column is added by LanceDB vector search
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            for (i, record) in batch_to_records(batch)?.into_iter().enumerate() {
                let distance = distances.map_or(0.0, |d| d.value(i));
                ranked.push(RankedMemory {
                    record,
                    similarity: 1.0 - distance,
                });
            }
        }

        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn list(
        &self,
        owner: &OwnerScope,
        kind: Option<MemoryKind>,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let mut query = self.table.query();
        if let Some(filter) = filter_for(Some(owner), kind) {
            query = query.only_if(filter);
        }
        let results = query
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to list {} records: {e}", self.tier)))?;

        let mut records = Vec::new();
        for batch in &self.collect(results).await? {
            records.extend(batch_to_records(batch)?);
        }
        Ok(records)
    }

    async fn delete(
        &self,
        owner: &OwnerScope,
        kind: Option<MemoryKind>,
    ) -> Result<u64, RepositoryError> {
        let Some(filter) = filter_for(Some(owner), kind) else {
            return Ok(0);
        };
        let count = self
            .table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows before delete: {e}")))?;
        if count == 0 {
            return Ok(0);
        }

        self.table
            .delete(&filter)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to delete {} records: {e}", self.tier)))?;
        Ok(count as u64)
    }

    async fn count(&self, owner: Option<&OwnerScope>) -> Result<u64, RepositoryError> {
        let count = self
            .table
            .count_rows(filter_for(owner, None))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DIM: usize = 4;

    async fn open(dir: &tempfile::TempDir, tier: MemoryTier) -> LanceMemoryIndex {
        let store = LanceVectorStore::new(dir.path().to_path_buf()).await.unwrap();
        LanceMemoryIndex::open(&store, tier, DIM).await.unwrap()
    }

    fn record(id: &str, owner: OwnerScope, kind: MemoryKind, embedding: [f32; DIM]) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            owner,
            kind,
            description: format!("record {id}"),
            embedding: embedding.to_vec(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_for_escapes_quotes() {
        let owner = OwnerScope::user("o'brien");
        assert_eq!(
            filter_for(Some(&owner), Some(MemoryKind::Goal)).unwrap(),
            "owner = 'user:o''brien' AND kind = 'goal'"
        );
        assert_eq!(filter_for(None, None), None);
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_owner() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir, MemoryTier::Episodic).await;
        index
            .add(&record("a1", OwnerScope::user("alice"), MemoryKind::Fact, [1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .add(&record("b1", OwnerScope::user("bob"), MemoryKind::Fact, [1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();

        let hits = index
            .search(Some(&OwnerScope::user("alice")), None, &[1.0, 0.0, 0.0, 0.0], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "a1");
        assert!((hits[0].similarity - 1.0).abs() < 1e-4);
        assert_eq!(hits[0].record.embedding, vec![1.0, 0.0, 0.0, 0.0]);

        let none = index
            .search(Some(&OwnerScope::user("carol")), None, &[1.0, 0.0, 0.0, 0.0], 5)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir, MemoryTier::Episodic).await;
        let owner = OwnerScope::user("alice");
        index
            .add(&record("far", owner.clone(), MemoryKind::Fact, [0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .add(&record("near", owner.clone(), MemoryKind::Fact, [0.9, 0.1, 0.0, 0.0]))
            .await
            .unwrap();

        let hits = index
            .search(Some(&owner), Some(MemoryKind::Fact), &[1.0, 0.0, 0.0, 0.0], 2)
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn test_add_rejects_wrong_dimension_and_duplicate_id() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir, MemoryTier::Episodic).await;
        let mut bad = record("x", OwnerScope::user("u"), MemoryKind::Fact, [1.0, 0.0, 0.0, 0.0]);
        bad.embedding.pop();
        assert!(index.add(&bad).await.is_err());

        let ok = record("x", OwnerScope::user("u"), MemoryKind::Fact, [1.0, 0.0, 0.0, 0.0]);
        index.add(&ok).await.unwrap();
        assert!(matches!(
            index.add(&ok).await.unwrap_err(),
            RepositoryError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_list_and_delete_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir, MemoryTier::Episodic).await;
        let owner = OwnerScope::user("alice");
        index
            .add(&record("f", owner.clone(), MemoryKind::Fact, [1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .add(&record("g1", owner.clone(), MemoryKind::Goal, [0.0, 1.0, 0.0, 0.0]))
            .await
            .unwrap();
        index
            .add(&record("g2", owner.clone(), MemoryKind::Goal, [0.0, 0.0, 1.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(index.list(&owner, Some(MemoryKind::Goal)).await.unwrap().len(), 2);
        assert_eq!(index.delete(&owner, Some(MemoryKind::Goal)).await.unwrap(), 2);
        assert_eq!(index.delete(&owner, Some(MemoryKind::Goal)).await.unwrap(), 0);
        assert_eq!(index.count(Some(&owner)).await.unwrap(), 1);
        assert_eq!(index.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pattern_metadata_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir, MemoryTier::Procedural).await;
        let mut pattern = record("p", OwnerScope::Global, MemoryKind::Pattern, [0.5, 0.5, 0.0, 0.0]);
        pattern.metadata = json!({"tools": ["get_sleep_data"], "score": 0.85});
        index.add(&pattern).await.unwrap();

        let listed = index.list(&OwnerScope::Global, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].outcome_score(), Some(0.85));
        assert_eq!(listed[0].metadata["tools"], json!(["get_sleep_data"]));
    }

    #[tokio::test]
    async fn test_reopen_with_other_dimension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceVectorStore::new(dir.path().to_path_buf()).await.unwrap();
        LanceMemoryIndex::open(&store, MemoryTier::Episodic, DIM).await.unwrap();
        assert!(LanceMemoryIndex::open(&store, MemoryTier::Episodic, DIM * 2).await.is_err());
    }
}
