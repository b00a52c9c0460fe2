//! CLI definitions for chatrelay.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{ChatConfig, HistoryLimits};

/// chatrelay CLI
#[derive(Parser, Debug)]
#[command(name = "chatrelay", version, about = "Streaming chat relay and terminal client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay HTTP server
    Serve(ServeArgs),
    /// Chat with a running relay (Ctrl-C cancels a reply, Ctrl-D exits)
    Chat(ChatArgs),
}

/// Arguments for `chatrelay serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address, overrides config and CHATRELAY_BIND
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Arguments for `chatrelay chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Relay endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:8787/chat")]
    pub endpoint: String,

    /// Bearer token sent to the relay
    #[arg(short, long)]
    pub token: Option<String>,

    /// Messages sent upstream per turn
    #[arg(long, default_value_t = 20)]
    pub window: usize,

    /// Messages retained before pruning
    #[arg(long, default_value_t = 50)]
    pub max_retained: usize,

    /// Seconds without data before a reply is abandoned
    #[arg(long, default_value_t = 60)]
    pub idle_timeout: u64,
}

impl ChatArgs {
    /// Session configuration from the flags.
    pub fn chat_config(&self) -> ChatConfig {
        let limits = HistoryLimits {
            window: self.window,
            max_retained: self.max_retained,
            retain_after_prune: self.window.min(self.max_retained.saturating_sub(4)),
        };
        ChatConfig::builder()
            .limits(limits)
            .idle_timeout(Duration::from_secs(self.idle_timeout))
            .build()
    }
}
