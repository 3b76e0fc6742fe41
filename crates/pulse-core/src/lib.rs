//! Business logic and port (trait) definitions for Pulse.
//!
//! This crate holds the memory subsystem (token accountant, embedding cache,
//! short-term / episodic / procedural stores), the intent router and the
//! tool-calling orchestrator. It defines the ports that the infrastructure
//! layer implements and depends only on `pulse-types` -- never on
//! `pulse-infra` or any database/HTTP crate.

pub mod agent;
pub mod chat;
pub mod llm;
pub mod memory;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;
