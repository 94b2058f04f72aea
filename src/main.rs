//! portdeck command line entry point.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};
use serde::Serialize;
use tokio::signal;
use tokio::sync::mpsc;

use portdeck::config::{Config, DEFAULT_CONFIG_PATH};
use portdeck::Dashboard;

#[derive(Parser)]
#[command(name = "portdeck", about = "Discover dashboard apps and report their status")]
struct Cli {
    /// Configuration file (YAML, or TOML/JSON by extension)
    #[arg(short, long, env = "PORTDECK_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the discovered apps with icons resolved
    Apps,
    /// Print the current status of every app
    Status,
    /// Print the app list at once, then icon updates as they resolve
    Icons,
    /// Print statuses repeatedly until interrupted
    Watch {
        /// Seconds between status runs
        #[arg(short, long, default_value_t = 10)]
        interval: u64,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    info!(
        "Loaded {} configured apps from {:?}",
        cfg.apps.len(),
        cli.config
    );

    let dashboard = Dashboard::from_config(cfg)?;

    match cli.command {
        Command::Apps => print_json(&dashboard.discover_apps().await?)?,
        Command::Status => print_json(&dashboard.get_statuses().await?)?,
        Command::Icons => stream_icons(&dashboard).await?,
        Command::Watch { interval } => {
            let interval = Duration::from_secs(interval.max(1));
            watch(&dashboard, interval, async {
                let _ = signal::ctrl_c().await;
            })
            .await?
        }
    }

    Ok(())
}

async fn stream_icons(dashboard: &Dashboard) -> anyhow::Result<()> {
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let done_tx = update_tx.clone();
    let _subscription = dashboard.subscribe_icons(
        move |update| {
            let _ = update_tx.send(Some(update.clone()));
        },
        move || {
            let _ = done_tx.send(None);
        },
    );

    print_json(&dashboard.discover_apps_deferred().await?)?;

    loop {
        tokio::select! {
            event = update_rx.recv() => match event {
                Some(Some(update)) => print_json(&update)?,
                _ => break,
            },
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping icon stream");
                break;
            }
        }
    }
    Ok(())
}

/// Prints statuses every `interval` until `shutdown` resolves, including
/// while a status run is still in flight.
async fn watch(
    dashboard: &Dashboard,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    loop {
        let run = async {
            ticker.tick().await;
            dashboard.get_statuses().await
        };
        tokio::select! {
            result = run => match result {
                Ok(statuses) => print_json(&statuses)?,
                Err(e) => error!("Status run failed: {}", e),
            },
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping status watch");
                return Ok(());
            }
        }
    }
}
