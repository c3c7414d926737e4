//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing. The CLI follows a noun-verb
//! pattern (e.g., `parley user add`, `parley user list`).

pub mod history;
pub mod status;
pub mod user;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Real-time direct messaging server.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
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

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API and WebSocket server.
    Serve {
        /// Port to listen on.
        #[arg(long, short, default_value = "3000", env = "PARLEY_PORT")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1", env = "PARLEY_HOST")]
        host: String,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,

        /// Export tracing spans through OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },

    /// Manage accounts.
    User {
        #[command(subcommand)]
        action: user::UserCommand,
    },

    /// Print the stored conversation between two users.
    History {
        /// First participant.
        user_a: String,

        /// Second participant.
        user_b: String,

        /// Only messages with an id greater than this.
        #[arg(long, default_value = "0")]
        since: u64,

        /// Maximum number of messages.
        #[arg(long, short = 'n', default_value = "50")]
        limit: u32,
    },

    /// Show system status.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
