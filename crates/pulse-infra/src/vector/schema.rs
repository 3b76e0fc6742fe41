//! Arrow schema for LanceDB memory tables.
//!
//! Both tiers share one layout; only the table name differs. The vector width
//! comes from the configured embedding model, so the schema is built at runtime.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

use pulse_types::memory::MemoryTier;

/// Schema for a memory tier table with `dimension`-wide embeddings.
pub fn memory_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("owner", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("description", DataType::Utf8, false),
        // JSON-encoded record metadata (pattern tools and score).
        Field::new("metadata", DataType::Utf8, true),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("vector", vector_type(dimension), false),
    ])
}

pub fn vector_type(dimension: i32) -> DataType {
    DataType::FixedSizeList(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension,
    )
}

/// Table holding the records of `tier`.
pub fn table_name(tier: MemoryTier) -> &'static str {
    match tier {
        MemoryTier::Episodic => "episodic_memory",
        MemoryTier::Procedural => "procedural_memory",
    }
}
