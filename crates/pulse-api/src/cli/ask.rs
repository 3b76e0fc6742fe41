//! Single-turn command and the shared turn rendering used by `chat`.

use anyhow::Result;
use console::style;
use serde_json::json;
use uuid::Uuid;

use pulse_core::agent::orchestrator::{TurnFailure, TurnRequest};
use pulse_types::agent::{TurnMetadata, TurnResponse, TurnStatus};

use crate::state::AppState;

/// Run one turn for `user` and print the answer.
///
/// # Examples
///
/// ```bash
/// pulse ask --user alice "How did I sleep this week?"
/// pulse ask --user alice --session 0190... "And last week?" --json
/// ```
pub async fn ask(
    state: &AppState,
    user: &str,
    session: Option<String>,
    message: &str,
    json: bool,
) -> Result<()> {
    let session_id = session.unwrap_or_else(new_session_id);
    let outcome = run_turn(state, TurnRequest::new(&session_id, user, message)).await;

    match outcome {
        Ok(response) => {
            print_response(&session_id, &response, json)?;
            Ok(())
        }
        Err(failure) => {
            print_failure(&session_id, &failure, json)?;
            Err(failure.into())
        }
    }
}

pub(crate) fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}

/// Run a turn; Ctrl+C while it is in flight cancels it.
pub(crate) async fn run_turn(state: &AppState, request: TurnRequest) -> Result<TurnResponse, TurnFailure> {
    let token = request.cancellation.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let result = state.assistant.handle(request).await;
    watcher.abort();
    result
}

pub(crate) fn print_response(session_id: &str, response: &TurnResponse, json: bool) -> Result<()> {
    if json {
        let out = json!({
            "session_id": session_id,
            "text": response.text,
            "status": response.status,
            "metadata": response.metadata,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {}", response.text);
    println!();
    if response.status == TurnStatus::IterationLimitExceeded {
        println!(
            "  {} Stopped after {} model calls; the answer may be incomplete.",
            style("!").yellow().bold(),
            response.metadata.iterations
        );
    }
    println!("  {}", style(summary_line(session_id, response.status, &response.metadata)).dim());
    println!();
    Ok(())
}

pub(crate) fn print_failure(session_id: &str, failure: &TurnFailure, json: bool) -> Result<()> {
    if json {
        let out = json!({
            "session_id": session_id,
            "error": failure.code,
            "message": failure.message,
            "metadata": failure.metadata,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("✗").red().bold(), failure.message);
    println!(
        "  {}",
        style(format!(
            "session {session_id} · {} · {} message(s) kept",
            failure.code,
            failure.transcript.len()
        ))
        .dim()
    );
    println!();
    Ok(())
}

/// `session … · status · N model calls · tools: a, b`
fn summary_line(session_id: &str, status: TurnStatus, metadata: &TurnMetadata) -> String {
    let status = match status {
        TurnStatus::Completed => "completed".to_string(),
        TurnStatus::Routed => format!(
            "routed ({})",
            metadata.routed_intent.as_deref().unwrap_or("intent")
        ),
        TurnStatus::IterationLimitExceeded => "iteration limit".to_string(),
    };

    let mut line = format!(
        "session {session_id} · {status} · {} model call{}",
        metadata.iterations,
        if metadata.iterations == 1 { "" } else { "s" }
    );
    if !metadata.invocations.is_empty() {
        let tools: Vec<&str> = metadata.invocations.iter().map(|i| i.name.as_str()).collect();
        line.push_str(&format!(" · tools: {}", tools.join(", ")));
    }
    if let Some(score) = metadata.outcome_score {
        line.push_str(&format!(" · score {score:.2}"));
    }
    line
}
