//! Vector database infrastructure for episodic and procedural memory.
//!
//! LanceDB connection management, the Arrow schema for memory tables, and the
//! `VectorIndex` implementation the memory stores run on.

pub mod lance;
pub mod memory;
pub mod schema;
