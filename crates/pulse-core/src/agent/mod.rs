pub mod assistant;
pub mod capability;
pub mod context;
pub mod executor;
pub mod health;
pub mod orchestrator;
pub mod outcome;
pub mod prompt;
pub mod writeback;
