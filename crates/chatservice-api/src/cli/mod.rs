//! CLI command definitions for the `chatsvc` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Chat with a language model inside a bounded context window.
#[derive(Parser)]
#[command(name = "chatsvc", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (overrides `[server].port`).
        #[arg(long, short)]
        port: Option<u16>,

        /// Host to bind (overrides `[server].host`).
        #[arg(long)]
        host: Option<String>,
    },

    /// Send one message and print the answer.
    Ask(AskArgs),

    /// Show a chat with its active and erased messages.
    Show {
        /// Chat ID to display.
        chat_id: String,
    },

    /// End a chat so it accepts no further messages.
    End {
        /// Chat ID to end.
        chat_id: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Args)]
pub struct AskArgs {
    /// The message to send.
    pub message: String,

    /// Continue an existing chat instead of starting a new one.
    #[arg(long, short)]
    pub chat: Option<String>,

    /// User the message is sent as.
    #[arg(long, short, env = "CHATSERVICE_USER", default_value = "cli")]
    pub user: String,

    /// Model for a new chat (overrides `[completion].model`).
    #[arg(long, short)]
    pub model: Option<String>,

    /// Print the answer as it is generated.
    #[arg(long, short)]
    pub stream: bool,
}
