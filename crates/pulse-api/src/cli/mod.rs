//! CLI command definitions and dispatch for the `pulse` binary.
//!
//! Uses clap derive macros for argument parsing. Turn commands (`ask`, `chat`)
//! run through the assistant; the remaining commands inspect or clear the
//! stores directly.

pub mod ask;
pub mod chat;
pub mod goals;
pub mod memory;
pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use pulse_types::memory::MemoryKind;

/// A memory-augmented assistant for your health data.
#[derive(Parser)]
#[command(name = "pulse", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Run the plain tool-calling loop: no router, memory capabilities or write-back.
    #[arg(long, global = true)]
    pub memoryless: bool,

    /// Extract facts with the model instead of the built-in heuristic.
    #[arg(long, global = true)]
    pub llm_extraction: bool,

    /// Data directory (database, vector store, config.toml).
    #[arg(long, global = true, env = "PULSE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a single question and print the answer.
    Ask {
        /// User the turn runs for.
        #[arg(long, short)]
        user: String,

        /// Session to continue (a new one is created when omitted).
        #[arg(long, short)]
        session: Option<String>,

        /// The message to send.
        message: String,
    },

    /// Interactive conversation over stdin.
    Chat {
        #[arg(long, short)]
        user: String,

        #[arg(long, short)]
        session: Option<String>,
    },

    /// Inspect or clear a user's goals.
    Goals {
        #[command(subcommand)]
        action: GoalsCommand,
    },

    /// Search a user's episodic memory.
    #[command(alias = "memories")]
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,
    },

    /// Search learned capability patterns.
    Patterns {
        #[command(subcommand)]
        action: PatternsCommand,
    },

    /// Inspect or clear a conversation session.
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum GoalsCommand {
    /// List goals, newest first.
    #[command(alias = "ls")]
    List {
        #[arg(long, short)]
        user: String,
    },

    /// Delete all goals of a user.
    Clear {
        #[arg(long, short)]
        user: String,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Similarity search over the user's facts and goals.
    Search {
        #[arg(long, short)]
        user: String,

        query: String,

        /// Maximum number of results.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// List the user's facts and goals, newest first.
    #[command(alias = "ls")]
    List {
        #[arg(long, short)]
        user: String,

        /// Only this kind (fact or goal).
        #[arg(long)]
        kind: Option<MemoryKind>,
    },
}

#[derive(Subcommand)]
pub enum PatternsCommand {
    /// Similarity search over learned query patterns.
    Search {
        query: String,

        #[arg(long, default_value_t = 3)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Print a session's recent messages.
    Show {
        #[arg(long, short)]
        session: String,

        /// Maximum number of messages to show.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Delete a session and its messages.
    Clear {
        #[arg(long, short)]
        session: String,
    },
}
