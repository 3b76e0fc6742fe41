//! Memory inspection: episodic search/list and procedural pattern search.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use pulse_types::memory::{MemoryKind, MemoryRecord, OwnerScope, RankedMemory};

use crate::state::AppState;

/// Similarity search over a user's facts and goals.
///
/// ```bash
/// pulse memory search --user alice "resting heart rate"
/// ```
pub async fn search_memories(state: &AppState, user: &str, query: &str, limit: usize, json: bool) -> Result<()> {
    let hits = state
        .context()
        .episodic
        .search(query, Some(&OwnerScope::user(user)), limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits_json(&hits))?);
        return Ok(());
    }
    if hits.is_empty() {
        print_empty(&format!("No memories for '{user}' match \"{query}\"."));
        return Ok(());
    }

    let mut table = new_table(vec!["Memory", "Kind", "Similarity", "Date"]);
    for hit in &hits {
        table.add_row(vec![
            Cell::new(truncate(&hit.record.description, 70)).fg(Color::White),
            kind_cell(hit.record.kind),
            Cell::new(format!("{:.3}", hit.similarity)).fg(Color::Yellow),
            Cell::new(hit.record.created_at.format("%Y-%m-%d").to_string()).fg(Color::DarkGrey),
        ]);
    }
    print_table(&format!("Memories for '{}'", style(user).cyan().bold()), &table, hits.len());
    Ok(())
}

/// List a user's facts and goals, newest first.
pub async fn list_memories(state: &AppState, user: &str, kind: Option<MemoryKind>, json: bool) -> Result<()> {
    let records = state
        .context()
        .episodic
        .list(&OwnerScope::user(user), kind)
        .await?;

    if json {
        let out: Vec<_> = records.iter().map(record_json).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    if records.is_empty() {
        print_empty(&format!(
            "No memories for '{user}'. Facts are extracted from conversations."
        ));
        return Ok(());
    }

    let mut table = new_table(vec!["Memory", "Kind", "Date"]);
    for record in &records {
        table.add_row(vec![
            Cell::new(truncate(&record.description, 70)).fg(Color::White),
            kind_cell(record.kind),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }
    print_table(&format!("Memories for '{}'", style(user).cyan().bold()), &table, records.len());
    Ok(())
}

/// Similarity search over learned query → capability patterns.
///
/// ```bash
/// pulse patterns search "how did I sleep"
/// ```
pub async fn search_patterns(state: &AppState, query: &str, limit: usize, json: bool) -> Result<()> {
    let hits = state
        .context()
        .procedural
        .search(query, Some(&OwnerScope::Global), limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits_json(&hits))?);
        return Ok(());
    }
    if hits.is_empty() {
        print_empty(&format!("No learned patterns match \"{query}\"."));
        return Ok(());
    }

    let mut table = new_table(vec!["Query", "Tools", "Score", "Similarity"]);
    for hit in &hits {
        let score = hit
            .record
            .outcome_score()
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(truncate(&hit.record.description, 50)).fg(Color::White),
            Cell::new(pattern_tools(&hit.record).join(" → ")).fg(Color::Cyan),
            Cell::new(score).fg(Color::Green),
            Cell::new(format!("{:.3}", hit.similarity)).fg(Color::Yellow),
        ]);
    }
    print_table("Learned patterns", &table, hits.len());
    Ok(())
}

fn pattern_tools(record: &MemoryRecord) -> Vec<String> {
    record
        .metadata
        .get("tools")
        .and_then(|t| t.as_array())
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn record_json(record: &MemoryRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "kind": record.kind,
        "description": record.description,
        "metadata": record.metadata,
        "created_at": record.created_at,
    })
}

/// Search hits without the raw embedding vectors.
fn hits_json(hits: &[RankedMemory]) -> serde_json::Value {
    hits.iter()
        .map(|hit| {
            let mut value = record_json(&hit.record);
            value["similarity"] = json!(hit.similarity);
            value
        })
        .collect()
}

fn kind_cell(kind: MemoryKind) -> Cell {
    let color = match kind {
        MemoryKind::Fact => Color::Cyan,
        MemoryKind::Goal => Color::Magenta,
        MemoryKind::Pattern => Color::Blue,
    };
    Cell::new(kind.to_string()).fg(color)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn new_table(headers: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.into_iter().map(|h| Cell::new(h).fg(Color::White)));
    table
}

fn print_table(title: &str, table: &Table, count: usize) {
    println!();
    println!("  {title}");
    println!();
    println!("{table}");
    println!();
    println!(
        "  {} result{}",
        style(count).bold(),
        if count == 1 { "" } else { "s" }
    );
    println!();
}

fn print_empty(message: &str) {
    println!();
    println!("  {} {message}", style("i").blue().bold());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(metadata: serde_json::Value) -> MemoryRecord {
        MemoryRecord {
            id: "global:1:0".into(),
            owner: OwnerScope::Global,
            kind: MemoryKind::Pattern,
            description: "how did I sleep this week".into(),
            embedding: vec![0.0; 4],
            metadata,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pattern_tools_reads_metadata() {
        let r = record(json!({"tools": ["get_sleep_data", "fetch_goals"], "score": 0.9}));
        assert_eq!(pattern_tools(&r), vec!["get_sleep_data", "fetch_goals"]);
        assert!(pattern_tools(&record(serde_json::Value::Null)).is_empty());
    }

    #[test]
    fn test_hits_json_omits_embedding() {
        let hits = vec![RankedMemory {
            record: record(json!({"tools": [], "score": 1.0})),
            similarity: 0.5,
        }];
        let value = hits_json(&hits);
        assert_eq!(value[0]["similarity"], json!(0.5));
        assert!(value[0].get("embedding").is_none());
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }
}
