use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dashboard_notifications::client::Collaborators;
use dashboard_notifications::config::{AppConfig, CliConfig, FileConfig, DEFAULT_WS_PATH};
use dashboard_notifications::{metrics, NotificationClient, TokenSource, TransportEvent};

const TOKEN_ENV_VAR: &str = "NOTIFY_TOKEN";

#[derive(Parser, Debug)]
#[clap(version = env!("APP_VERSION"))]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI flags.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the dashboard server, e.g. https://dash.example.com
    #[clap(long)]
    pub api_base_url: Option<String>,

    /// Path of the realtime endpoint.
    #[clap(long, default_value = DEFAULT_WS_PATH)]
    pub ws_path: String,

    /// Bearer token. Falls back to the NOTIFY_TOKEN environment variable.
    #[clap(long)]
    pub token: Option<String>,

    /// Timeout in seconds for REST requests.
    #[clap(long, default_value_t = 30)]
    pub request_timeout_sec: u64,

    /// Number of notifications fetched per page.
    #[clap(long, default_value_t = 50)]
    pub page_size: u32,

    /// Print Prometheus metrics on exit.
    #[clap(long)]
    pub print_metrics: bool,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            api_base_url: self.api_base_url.clone(),
            ws_path: self.ws_path.clone(),
            token: self
                .token
                .clone()
                .or_else(|| std::env::var(TOKEN_ENV_VAR).ok()),
            request_timeout_sec: self.request_timeout_sec,
            page_size: self.page_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    if config.token.is_none() {
        warn!(
            "No token given via --token, config file or {}; waiting without a session",
            TOKEN_ENV_VAR
        );
    }

    metrics::init_metrics();

    let tokens = Arc::new(TokenSource::new(config.token.clone()));
    let client = NotificationClient::start(&config, Collaborators::http(&config, tokens.clone()))?;

    let mut events = client.subscribe();
    let mut status = client.watch_status();
    info!(
        "Watching notifications (v{}, {})",
        env!("APP_VERSION"),
        env!("GIT_HASH")
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(TransportEvent::NotificationPushed(record)) => {
                    info!("[{:?}] {}: {}", record.kind, record.title, record.message);
                }
                Some(TransportEvent::TransportError(message)) => {
                    warn!("Transport error: {}", message);
                }
                Some(TransportEvent::ConnectionStateChanged(_)) => {}
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                let unread = client.store().unread_count().await;
                info!(
                    "Status: connection={} mode={} unread={}",
                    current.connection, current.mode, unread
                );
            }
        }
    }

    client.shutdown().await;

    if cli_args.print_metrics {
        println!("{}", metrics::render_metrics());
    }
    Ok(())
}
