//! Goal commands: list and clear a user's goals.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use pulse_types::memory::{MemoryKind, OwnerScope};

use crate::state::AppState;

/// List a user's goals, newest first. The first row is the one in effect.
///
/// ```bash
/// pulse goals list --user alice
/// ```
pub async fn list_goals(state: &AppState, user: &str, json: bool) -> Result<()> {
    let goals = state.context().episodic.latest_goals(user).await?;

    if json {
        let out: Vec<_> = goals
            .iter()
            .map(|g| json!({"id": g.id, "goal": g.description, "created_at": g.created_at}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if goals.is_empty() {
        println!();
        println!(
            "  {} No goals for '{}'. Try: pulse ask --user {user} \"My goal is to ...\"",
            style("i").blue().bold(),
            style(user).cyan(),
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Goal").fg(Color::White),
        Cell::new("Set").fg(Color::White),
    ]);

    for (i, goal) in goals.iter().enumerate() {
        let color = if i == 0 { Color::Green } else { Color::DarkGrey };
        table.add_row(vec![
            Cell::new(&goal.description).fg(color),
            Cell::new(goal.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  Goals for '{}'", style(user).cyan().bold());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// Delete every goal of a user.
pub async fn clear_goals(state: &AppState, user: &str, json: bool) -> Result<()> {
    let removed = state
        .context()
        .episodic
        .delete(&OwnerScope::user(user), Some(MemoryKind::Goal))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({"user_id": user, "removed": removed}))?);
    } else {
        println!();
        println!(
            "  {} Removed {} goal{} for '{}'",
            style("✓").green().bold(),
            style(removed).bold(),
            if removed == 1 { "" } else { "s" },
            style(user).cyan()
        );
        println!();
    }
    Ok(())
}
