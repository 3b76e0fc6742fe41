//! Line-oriented interactive chat over stdin.
//!
//! Each line is one turn in the same session. `/clear` drops the session's
//! short-term log and starts a fresh session; `/exit` (or EOF) quits.

use std::io::Write;

use anyhow::Result;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};

use pulse_core::agent::orchestrator::TurnRequest;
use pulse_core::chat::short_term::ShortTermStore;

use super::ask::{new_session_id, print_failure, print_response, run_turn};
use crate::state::AppState;

/// What a line of input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Message(&'a str),
    Clear,
    Exit,
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/exit" | "/quit" => Input::Exit,
        "/clear" => Input::Clear,
        text => Input::Message(text),
    }
}

pub async fn run_chat(state: &AppState, user: &str, session: Option<String>, json: bool) -> Result<()> {
    let mut session_id = session.unwrap_or_else(new_session_id);

    if !json {
        println!();
        println!(
            "  {} Pulse · {} assistant · session {}",
            style("♥").red().bold(),
            state.context().variant(),
            style(&session_id).cyan()
        );
        println!(
            "  {}",
            style(format!(
                "data in {} · Ctrl+C cancels an answer, /clear resets, /exit quits",
                state.data_dir.display()
            ))
            .dim()
        );
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !json {
            print!("{} ", style("you ›").green().bold());
            std::io::stdout().flush()?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Exit => break,
            Input::Clear => {
                let removed = state.context().short_term.clear(&session_id).await?;
                session_id = new_session_id();
                if !json {
                    println!(
                        "  {} Cleared {removed} message(s); new session {}",
                        style("✓").green(),
                        style(&session_id).cyan()
                    );
                }
            }
            Input::Message(text) => {
                match run_turn(state, TurnRequest::new(&session_id, user, text)).await {
                    Ok(response) => print_response(&session_id, &response, json)?,
                    // A failed turn keeps the session usable.
                    Err(failure) => {
                        tracing::warn!(session_id = %session_id, error = %failure.error, "Turn failed");
                        print_failure(&session_id, &failure, json)?;
                    }
                }
            }
        }
    }

    Ok(())
}
