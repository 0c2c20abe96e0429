//! ResQ viewer entry point.
//!
//! ```text
//! resq-viewer                        Connect with defaults
//! resq-viewer --config <path>        Use custom config TOML
//! resq-viewer --endpoint <addr>      Override the stream endpoint
//! resq-viewer --gen-config           Dump default config and exit
//! resq-viewer --write-config <path>  Write default config to a file and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use resq_core::StreamClient;
use resq_viewer::config::ViewerConfig;
use resq_viewer::monitor::{StatusMonitor, status_line};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "resq-viewer", about = "ResQ robot camera stream monitor")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "resq-viewer.toml")]
    config: PathBuf,

    /// Stream endpoint (overrides config). Example: 192.168.4.20:8765
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to a file and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    if let Some(path) = cli.write_config {
        ViewerConfig::write_default(&path)?;
        println!("wrote default config to {}", path.display());
        return Ok(());
    }

    // A malformed file aborts here; the error reaches stderr without tracing.
    let loaded = ViewerConfig::load(&cli.config)?;
    let found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    if let Some(endpoint) = cli.endpoint {
        config.stream.endpoint = endpoint;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("resq-viewer v{}", env!("CARGO_PKG_VERSION"));
    if found {
        info!("config loaded from {}", cli.config.display());
    } else {
        info!("no config at {}; using defaults", cli.config.display());
    }

    let stream_config = config.stream_config();
    info!(
        "stream endpoint: {} (reconnect every {:?})",
        stream_config.endpoint, stream_config.reconnect_delay
    );

    let client = StreamClient::spawn(stream_config)?;
    let mut observations = client.subscribe();
    let mut monitor = StatusMonitor::new();

    let mut summary = config.summary_interval().map(tokio::time::interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received; shutting down");
                break;
            }
            changed = observations.changed() => {
                if changed.is_err() {
                    break;
                }
                let obs = observations.borrow_and_update().clone();
                let events = monitor.update(&obs);
                monitor.report(&events);
            }
            _ = async {
                match summary.as_mut() {
                    Some(interval) => interval.tick().await,
                    None => std::future::pending().await,
                }
            } => {
                info!("{}", status_line(&client.observation()));
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
