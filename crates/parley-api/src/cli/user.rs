//! Account management CLI commands: add, list.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Password;
use secrecy::SecretString;

use crate::state::AppState;

/// Account subcommands.
#[derive(Subcommand)]
pub enum UserCommand {
    /// Create an account.
    Add {
        /// Username (letters, digits, `_`, `-`, `.`).
        username: String,

        /// Password. Prompted for with hidden input when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// List accounts.
    #[command(alias = "ls")]
    List,
}

/// Handle a user subcommand.
pub async fn handle_user_command(cmd: UserCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        UserCommand::Add { username, password } => {
            add_user(state, &username, password, json).await
        }
        UserCommand::List => list_users(state, json).await,
    }
}

/// Create an account.
///
/// # Examples
///
/// ```bash
/// # Secure prompt (recommended)
/// parley user add alice
///
/// # Script/automation mode
/// parley user add alice --password hunter2
/// ```
async fn add_user(
    state: &AppState,
    username: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => Password::new()
            .with_prompt(format!("Password for {}", style(username).bold()))
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()?,
    };
    let password = SecretString::from(password);

    let account = state.account_service.register(username, &password).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        println!(
            "  {} User '{}' created",
            style("✓").green().bold(),
            style(&account.user_id).bold()
        );
    }

    Ok(())
}

async fn list_users(state: &AppState, json: bool) -> Result<()> {
    let users = state.account_service.list_users().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    if users.is_empty() {
        println!();
        println!(
            "  {} No users yet. Add one with: {}",
            style("i").blue().bold(),
            style("parley user add <name>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("User").fg(Color::White),
        Cell::new("Tokens").fg(Color::White),
        Cell::new("Online").fg(Color::White),
        Cell::new("Created").fg(Color::White),
    ]);

    for user in &users {
        let online = state.registry.active_sessions(&user.user_id).len();
        table.add_row(vec![
            Cell::new(&user.user_id).fg(Color::Cyan),
            Cell::new(user.active_tokens),
            Cell::new(online),
            Cell::new(user.created_at.format("%Y-%m-%d").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} user{}",
        style(users.len()).bold(),
        if users.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}
