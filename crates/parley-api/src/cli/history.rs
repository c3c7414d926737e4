//! Conversation history CLI command.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use parley_types::event::NewMessage;
use parley_types::user::UserId;

use crate::state::AppState;

/// Print messages exchanged between `user_a` and `user_b`, ascending by id.
pub async fn show_history(
    state: &AppState,
    user_a: &str,
    user_b: &str,
    since: u64,
    limit: u32,
    json: bool,
) -> Result<()> {
    let a = UserId::parse(user_a).with_context(|| format!("Invalid user '{user_a}'"))?;
    let b = UserId::parse(user_b).with_context(|| format!("Invalid user '{user_b}'"))?;

    let query = state.router.history_query(&a, &b, since, limit);
    let messages = query.collect(state.router.store().clone()).await?;

    if json {
        let frames: Vec<NewMessage> = messages.iter().map(NewMessage::from).collect();
        println!("{}", serde_json::to_string_pretty(&frames)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!(
            "  {} No messages in {}",
            style("i").blue().bold(),
            style(&query.conversation_id).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("From").fg(Color::White),
        Cell::new("Message").fg(Color::White),
        Cell::new("Delivered").fg(Color::White),
        Cell::new("Sent").fg(Color::White),
    ]);

    for msg in &messages {
        table.add_row(vec![
            Cell::new(msg.message_id).fg(Color::DarkGrey),
            Cell::new(&msg.sender_id).fg(Color::Cyan),
            Cell::new(&msg.body),
            Cell::new(msg.delivered.len()),
            Cell::new(msg.created_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  {}", style(&query.conversation_id).bold());
    println!("{table}");
    if messages.len() as u32 == query.limit {
        if let Some(last) = messages.last() {
            println!(
                "  {} more may follow: {}",
                style("…").dim(),
                style(format!(
                    "parley history {user_a} {user_b} --since {}",
                    last.message_id
                ))
                .yellow()
            );
        }
    }
    println!();

    Ok(())
}
