//! CLI command definitions

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "uof")]
#[command(about = "Tail and query a UOF odds feed backend", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend origin; both endpoints are derived from it
    #[arg(long, env = "UOF_ORIGIN", global = true)]
    pub origin: Option<String>,

    /// Streaming endpoint (overrides the one derived from --origin)
    #[arg(long, env = "UOF_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// API endpoint (overrides the one derived from --origin)
    #[arg(long, env = "UOF_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Do not reconnect when the feed drops
    #[arg(long, global = true)]
    pub no_reconnect: bool,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long, env = "UOF_RECONNECT_INTERVAL_MS", global = true)]
    pub reconnect_interval_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream live messages as JSON lines until Ctrl-C
    ///
    /// Examples:
    ///   uof tail
    ///   uof tail -t odds_change -t bet_stop
    ///   uof tail -e sr:match:12345
    Tail {
        /// Only receive these message types (can be repeated)
        #[arg(short = 't', long = "message-type")]
        message_types: Vec<String>,

        /// Only receive messages for these events (can be repeated)
        #[arg(short = 'e', long = "event-id")]
        event_ids: Vec<String>,
    },

    /// List stored messages, newest first
    Messages {
        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        offset: Option<u32>,

        /// Only messages for this event
        #[arg(long)]
        event_id: Option<String>,

        /// Only messages of this type
        #[arg(long)]
        message_type: Option<String>,
    },

    /// List tracked events
    Events,

    /// List stored messages for one event
    EventMessages {
        /// Event ID (e.g. sr:match:12345)
        event_id: String,
    },

    /// Show aggregate counters
    Stats,

    /// Check backend health
    Health,
}
