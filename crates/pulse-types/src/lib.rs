//! Shared domain types for Pulse.
//!
//! This crate contains the domain types used across the Pulse assistant core:
//! messages and sessions, memory records, capability invocations, turn
//! metadata, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
