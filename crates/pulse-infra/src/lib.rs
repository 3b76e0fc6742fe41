//! Infrastructure layer for Pulse.
//!
//! Implements the ports defined in `pulse-core`: the SQLite Short-Term Store
//! and embedding-cache backing store, the LanceDB vector index for episodic
//! and procedural memory, and HTTP clients for the model, embedding and
//! health data services. Also loads configuration from the data directory.

pub mod config;
pub mod embedding;
pub mod health;
pub mod llm;
pub mod sqlite;
pub mod vector;
