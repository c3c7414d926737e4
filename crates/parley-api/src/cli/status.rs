//! System status dashboard command.

use anyhow::Result;
use console::style;
use parley_core::repository::message::MessageStore;

use crate::state::AppState;

/// Display system status dashboard.
///
/// Shows account and message counts, delivery tuning, storage info and
/// version.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let users = state.account_service.list_users().await?;
    let active_tokens: u32 = users.iter().map(|u| u.active_tokens).sum();

    let store = state.router.store();
    let messages = store.count_messages().await?;
    let conversations = store.count_conversations().await?;
    let config = &state.config;

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "users": users.len(),
            "active_tokens": active_tokens,
            "messages": messages,
            "conversations": conversations,
            "config": &**config,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Parley v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Accounts ──").dim());
    println!("  Users:         {}", style(users.len()).bold());
    println!("  Active tokens: {}", style(active_tokens).green());
    println!();

    println!("  {}", style("── Messages ──").dim());
    println!("  Conversations: {}", style(conversations).bold());
    println!("  Messages:      {}", style(messages).bold());
    println!();

    println!("  {}", style("── Delivery ──").dim());
    println!("  Push timeout:  {} ms", config.push_timeout_ms);
    println!("  Mailbox size:  {}", config.mailbox_capacity);
    println!("  Max body:      {} bytes", config.max_body_bytes);
    println!(
        "  History:       {} per page, at most {} per request",
        config.history_page_size, config.max_history_limit
    );
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!("  Database: {}", style("SQLite (WAL mode)").dim());
    println!();

    Ok(())
}
