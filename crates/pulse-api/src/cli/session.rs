//! Session commands: show and clear a short-term conversation log.

use anyhow::Result;
use console::style;
use serde_json::json;

use pulse_core::chat::short_term::ShortTermStore;
use pulse_types::llm::MessageRole;

use crate::state::AppState;

/// Print the last `limit` messages of a live session.
///
/// ```bash
/// pulse session show --session 0190...
/// ```
pub async fn show_session(state: &AppState, session_id: &str, limit: usize, json: bool) -> Result<()> {
    let store = &state.context().short_term;
    let Some(session) = store.get_session(session_id).await? else {
        if json {
            println!("{}", json!({"session_id": session_id, "found": false}));
        } else {
            println!();
            println!(
                "  {} Session '{}' not found or expired.",
                style("i").blue().bold(),
                style(session_id).cyan()
            );
            println!();
        }
        return Ok(());
    };
    let messages = store.read(session_id, limit).await?;

    if json {
        let out = json!({
            "session": session,
            "messages": messages,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  Session {} · user {} · expires {}",
        style(&session.id).cyan().bold(),
        style(&session.user_id).cyan(),
        session.expires_at.format("%Y-%m-%d %H:%M")
    );
    println!();
    for message in &messages {
        let label = match message.role {
            MessageRole::System => style("system").dim(),
            MessageRole::User => style("user").green().bold(),
            MessageRole::Assistant => style("assistant").blue().bold(),
            MessageRole::Tool => style("tool").yellow(),
        };
        let body = if message.content.is_empty() && !message.tool_calls.is_empty() {
            let names: Vec<&str> = message.tool_calls.iter().map(|c| c.name.as_str()).collect();
            format!("→ {}", names.join(", "))
        } else {
            message.content.clone()
        };
        println!("  {label:>10}  {body}");
    }
    println!();
    Ok(())
}

/// Delete a session and its messages.
pub async fn clear_session(state: &AppState, session_id: &str, json: bool) -> Result<()> {
    let removed = state.context().short_term.clear(session_id).await?;

    if json {
        println!("{}", json!({"session_id": session_id, "removed": removed}));
    } else {
        println!();
        println!(
            "  {} Removed {} message{} from session '{}'",
            style("✓").green().bold(),
            style(removed).bold(),
            if removed == 1 { "" } else { "s" },
            style(session_id).cyan()
        );
        println!();
    }
    Ok(())
}
