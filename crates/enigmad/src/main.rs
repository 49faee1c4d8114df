//! enigmad: Enigma ingestion daemon
//!
//! Usage:
//!   enigmad [--config /etc/enigma/enigma.toml] [--listen 0.0.0.0:8700]
//!
//! Accepts encrypted envelopes on `POST /v1/ingest`, authenticates the tenant
//! by API key, decrypts with the tenant's registry secret and forwards the
//! payload to the ingestion sink.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use enigma_core::config::EnigmaConfig;
use enigmad::daemon;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "enigmad", version, about = "Enigma encrypted ingestion daemon")]
struct Cli {
    /// Path to enigma.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "ENIGMA_CONFIG",
        default_value = "/etc/enigma/enigma.toml"
    )]
    config: PathBuf,

    /// Override the gateway listen address
    #[arg(long, env = "ENIGMA_LISTEN")]
    listen: Option<String>,

    /// Override the secret registry file
    #[arg(long, env = "ENIGMA_REGISTRY")]
    registry: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ENIGMA_LOG")]
    log: Option<String>,

    /// Log format
    #[arg(long, env = "ENIGMA_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, found) = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.logging.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "enigmad starting"
    );
    if !found {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    if let Some(listen) = cli.listen {
        config.gateway.listen = listen;
    }
    if let Some(registry) = cli.registry {
        config.registry.path = registry;
    }

    daemon::run(config).await
}

/// Returns the parsed config and whether the file existed.
async fn load_config(path: &Path) -> Result<(EnigmaConfig, bool)> {
    if !path.exists() {
        return Ok((EnigmaConfig::default(), false));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    let config =
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
    Ok((config, true))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
