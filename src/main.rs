//! # vantage
//!
//! Command-line front-end for the metrics clients: one-shot resource fetches,
//! a live event watcher, and a settings dump.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;
use vantage_core::init_subscriber;
use vantage_resource::{FetchOptions, Resource, ResourceClient};
use vantage_settings::{VantageSettings, load_settings, load_settings_from_path};
use vantage_stream::{EventKind, StreamClient};

/// Metrics API client.
#[derive(Parser, Debug)]
#[command(name = "vantage", about = "Metrics API client", version)]
struct Cli {
    /// Settings file (defaults to `~/.vantage/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// API base address (overrides settings).
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Stream address (overrides settings).
    #[arg(long, global = true)]
    stream_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one resource and print it as JSON.
    Fetch {
        /// Resource to fetch.
        resource: ResourceArg,
        /// Timeline start tick.
        #[arg(long)]
        start: Option<i64>,
        /// Timeline end tick.
        #[arg(long)]
        end: Option<i64>,
        /// Comma-separated series for `timeseries`.
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
        /// Agent identifier for `agent`.
        #[arg(long)]
        id: Option<String>,
        /// Skip the cache.
        #[arg(long)]
        force: bool,
    },
    /// Print stream events as JSON lines until interrupted.
    Watch {
        /// Event types to print (default: all built-in kinds).
        #[arg(long, value_delimiter = ',')]
        events: Vec<String>,
    },
    /// Print the effective settings.
    Settings,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ResourceArg {
    Health,
    Network,
    Timeline,
    Spatial,
    Inequality,
    Cultural,
    Timeseries,
    Agent,
}

const WATCHED_BY_DEFAULT: [EventKind; 8] = [
    EventKind::MetricsUpdate,
    EventKind::NetworkUpdate,
    EventKind::Connected,
    EventKind::Error,
    EventKind::Disconnect,
    EventKind::Reconnecting,
    EventKind::Reconnected,
    EventKind::MaxReconnectAttempts,
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => load_settings().context("Failed to load settings")?,
    };
    if let Some(url) = cli.api_url {
        settings.api_url = url;
    }
    if let Some(url) = cli.stream_url {
        settings.stream_url = url;
    }

    init_subscriber(&settings.logging.level, settings.logging.format);

    match cli.command {
        Command::Fetch {
            resource,
            start,
            end,
            metrics,
            id,
            force,
        } => {
            let resource = build_resource(resource, start, end, metrics, id)?;
            fetch(&settings, resource, force).await
        }
        Command::Watch { events } => watch(&settings, &events).await,
        Command::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn build_resource(
    arg: ResourceArg,
    start: Option<i64>,
    end: Option<i64>,
    metrics: Vec<String>,
    id: Option<String>,
) -> Result<Resource> {
    Ok(match arg {
        ResourceArg::Health => Resource::Health,
        ResourceArg::Network => Resource::Network,
        ResourceArg::Timeline => Resource::Timeline { start, end },
        ResourceArg::Spatial => Resource::Spatial,
        ResourceArg::Inequality => Resource::Inequality,
        ResourceArg::Cultural => Resource::Cultural,
        ResourceArg::Timeseries => Resource::TimeSeries { metrics },
        ResourceArg::Agent => match id {
            Some(id) => Resource::Agent { id },
            None => bail!("--id is required for the agent resource"),
        },
    })
}

async fn fetch(settings: &VantageSettings, resource: Resource, force: bool) -> Result<()> {
    let client = ResourceClient::new(&settings.api_url, settings.resource.clone())?;
    info!(resource = %resource, force, "fetching");
    let body = client
        .fetch(resource.clone(), FetchOptions { force })
        .await
        .with_context(|| format!("Failed to fetch {}", resource.name()))?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn watch(settings: &VantageSettings, events: &[String]) -> Result<()> {
    let client = StreamClient::new(&settings.stream_url, settings.stream.clone())?;

    let kinds: Vec<EventKind> = if events.is_empty() {
        WATCHED_BY_DEFAULT.to_vec()
    } else {
        events.iter().map(|e| EventKind::from(e.as_str())).collect()
    };
    // Connection lifecycle goes to the log; stdout carries only feed data.
    for kind in kinds {
        let name = kind.as_str().to_owned();
        if kind.is_lifecycle() {
            let _ = client.on(kind, move |data| info!(event = %name, data = %data, "stream"));
        } else {
            let _ = client.on(kind, move |data| {
                println!("{}", json!({ "type": name, "data": data }));
            });
        }
    }

    info!(url = %client.url(), "watching; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    client.disconnect();
    Ok(())
}
