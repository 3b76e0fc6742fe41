//! Pulse CLI entry point.
//!
//! Binary name: `pulse`
//!
//! Parses CLI arguments, wires the assistant context over the on-disk stores,
//! then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, GoalsCommand, MemoryCommand, PatternsCommand, SessionCommand};
use state::{AppState, InitOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,pulse_core=debug",
        _ => "trace",
    };

    if let Err(e) = pulse_observe::tracing_setup::init_tracing(cli.otel, filter) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "pulse", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(InitOptions {
        data_dir: cli.data_dir.clone(),
        memoryless: cli.memoryless,
        llm_extraction: cli.llm_extraction,
    })
    .await?;

    let result = dispatch(&state, cli).await;
    pulse_observe::tracing_setup::shutdown_tracing();
    result
}

async fn dispatch(state: &AppState, cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Ask {
            user,
            session,
            message,
        } => {
            cli::ask::ask(state, &user, session, &message, json).await?;
        }

        Commands::Chat { user, session } => {
            cli::chat::run_chat(state, &user, session, json).await?;
        }

        Commands::Goals { action } => match action {
            GoalsCommand::List { user } => cli::goals::list_goals(state, &user, json).await?,
            GoalsCommand::Clear { user } => cli::goals::clear_goals(state, &user, json).await?,
        },

        Commands::Memory { action } => match action {
            MemoryCommand::Search { user, query, limit } => {
                cli::memory::search_memories(state, &user, &query, limit, json).await?;
            }
            MemoryCommand::List { user, kind } => {
                cli::memory::list_memories(state, &user, kind, json).await?;
            }
        },

        Commands::Patterns { action } => match action {
            PatternsCommand::Search { query, limit } => {
                cli::memory::search_patterns(state, &query, limit, json).await?;
            }
        },

        Commands::Session { action } => match action {
            SessionCommand::Show { session, limit } => {
                cli::session::show_session(state, &session, limit, json).await?;
            }
            SessionCommand::Clear { session } => {
                cli::session::clear_session(state, &session, json).await?;
            }
        },

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
