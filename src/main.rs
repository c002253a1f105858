//! UOF feed CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uof_client::{ConnectionState, MessageQuery, UofClient, UofConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays pipeable
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let client = UofClient::new(config);

    match cli.command {
        Commands::Tail { message_types, event_ids } => tail(client, message_types, event_ids).await,
        Commands::Messages { limit, offset, event_id, message_type } => {
            let query = MessageQuery { limit, offset, event_id, message_type };
            print_json(&client.get_messages(&query).await.context("Failed to list messages")?)
        }
        Commands::Events => {
            print_json(&client.get_tracked_events().await.context("Failed to list events")?)
        }
        Commands::EventMessages { event_id } => print_json(
            &client
                .get_event_messages(&event_id)
                .await
                .with_context(|| format!("Failed to list messages for {}", event_id))?,
        ),
        Commands::Stats => print_json(&client.get_stats().await.context("Failed to fetch stats")?),
        Commands::Health => print_json(&client.health().await.context("Health check failed")?),
    }
}

/// Environment first, then flags on top
fn build_config(cli: &Cli) -> Result<UofConfig> {
    let mut config = UofConfig::from_env().context("Invalid UOF_* environment")?;

    if let Some(origin) = &cli.origin {
        let derived = UofConfig::from_origin(origin)
            .with_context(|| format!("Invalid origin: {}", origin))?;
        config.ws_url = derived.ws_url;
        config.api_url = derived.api_url;
    }
    if let Some(ws_url) = &cli.ws_url {
        config.ws_url = ws_url.clone();
    }
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
    }
    if cli.no_reconnect {
        config.auto_reconnect = false;
    }
    if let Some(ms) = cli.reconnect_interval_ms.filter(|ms| *ms > 0) {
        config.reconnect_interval = Duration::from_millis(ms);
    }

    Ok(config)
}

async fn tail(client: UofClient, message_types: Vec<String>, event_ids: Vec<String>) -> Result<()> {
    client.listen("message", |event| {
        if let Some(msg) = event.as_message() {
            println!("{}", msg.payload());
        }
    });
    client.listen("error", |event| {
        if let Some(err) = event.as_error() {
            warn!(error = %err, "Feed error");
        }
    });

    client.subscribe(message_types, event_ids);
    info!(url = %client.config().ws_url, "Tailing feed (Ctrl-C to stop)");
    client.connect();

    let auto_reconnect = client.config().auto_reconnect;
    let mut states = client.state_receiver();
    let closed = async move {
        if auto_reconnect {
            std::future::pending::<()>().await;
        }
        // Idle here means the connect attempt could not even start
        let _ = states
            .wait_for(|s| matches!(s, ConnectionState::Closed | ConnectionState::Idle))
            .await;
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted");
        }
        _ = closed => {
            info!("Feed closed");
        }
    }

    client.disconnect();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
