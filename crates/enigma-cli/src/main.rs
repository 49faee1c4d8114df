//! enigma: operator CLI for the Enigma envelope protocol
//!
//! Commands:
//!   derive                 - print the fingerprint of a tenant's daily key
//!   seal <payload|->       - encrypt a JSON payload into an envelope
//!   open <envelope|->      - verify and decrypt an envelope against a registry
//!   send <payload|->       - seal and POST a payload to the ingestion gateway
//!   secret generate        - print a fresh random master secret (base64)
//!   secret rotate          - add a new active secret version to a registry file
//!   secret list            - list tenants and versions (never secrets)
//!   config show            - display the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use enigma_client::{EnigmaClient, TenantCredentials};
use enigma_core::config::EnigmaConfig;
use enigma_core::{Clock, ContextBinding, FixedClock, KeyDate, SecretVersion, SystemClock};
use enigma_crypto::{derive_key_for_date, seal_payload, MasterSecret};
use enigma_receiver::{DateWindow, Receiver};
use enigma_secrets::{cleanup_backups, load_registry_file, rotate_registry_file, SecretRegistry};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "enigma",
    version,
    about = "Enigma envelope encryption tool",
    long_about = "enigma: derive, seal, open and send encrypted ingestion envelopes; manage tenant secrets"
)]
struct Cli {
    /// Path to enigma.toml configuration file
    #[arg(long, short = 'c', env = "ENIGMA_CONFIG", default_value = "/etc/enigma/enigma.toml")]
    config: PathBuf,

    /// Log level for diagnostics on stderr
    #[arg(long, env = "ENIGMA_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the SHA-256 fingerprint of the key for (app key, date)
    Derive {
        #[arg(long)]
        app_key: String,
        /// Key date, YYYY-MM-DD (default: today, UTC)
        #[arg(long, value_parser = parse_date)]
        date: Option<KeyDate>,
        /// Base64 master secret. Prefer ENIGMA_MASTER_SECRET: arguments are
        /// visible in the process list.
        #[arg(long, env = "ENIGMA_MASTER_SECRET", hide_env_values = true, value_parser = parse_secret)]
        secret: SecretString,
    },

    /// Encrypt a JSON payload and print the envelope
    Seal {
        #[arg(long)]
        app_key: String,
        /// Secret version the master secret belongs to
        #[arg(long = "version", value_parser = parse_version)]
        secret_version: SecretVersion,
        /// Key date, YYYY-MM-DD (default: today, UTC)
        #[arg(long, value_parser = parse_date)]
        date: Option<KeyDate>,
        /// Base64 master secret (prefer ENIGMA_MASTER_SECRET)
        #[arg(long, env = "ENIGMA_MASTER_SECRET", hide_env_values = true, value_parser = parse_secret)]
        secret: SecretString,
        /// Associated-data binding (default: from config)
        #[arg(long)]
        binding: Option<BindingArg>,
        /// JSON payload, or `-` for stdin
        payload: String,
    },

    /// Verify and decrypt an envelope with a registry file
    Open {
        #[arg(long)]
        app_key: String,
        /// Registry file (default: from config)
        #[arg(long, env = "ENIGMA_REGISTRY")]
        registry: Option<PathBuf>,
        /// Pretend today is this date when applying the date window
        #[arg(long, value_parser = parse_date)]
        today: Option<KeyDate>,
        /// Skip the key-date window check
        #[arg(long)]
        ignore_window: bool,
        #[arg(long)]
        binding: Option<BindingArg>,
        /// Envelope JSON, or `-` for stdin
        envelope: String,
    },

    /// Seal a payload with today's key and POST it to the gateway
    Send {
        #[arg(long)]
        app_key: String,
        #[arg(long = "version", value_parser = parse_version)]
        secret_version: SecretVersion,
        /// Base64 master secret (prefer ENIGMA_MASTER_SECRET)
        #[arg(long, env = "ENIGMA_MASTER_SECRET", hide_env_values = true, value_parser = parse_secret)]
        secret: SecretString,
        /// Gateway base URL (default: from config)
        #[arg(long, env = "ENIGMA_BASE_URL")]
        base_url: Option<String>,
        #[arg(long)]
        binding: Option<BindingArg>,
        /// JSON payload, or `-` for stdin
        payload: String,
    },

    /// Tenant master secret management
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum SecretAction {
    /// Print a new random 32-byte secret, base64
    Generate,

    /// Add a new active version for a tenant and retire versions beyond the grace window
    Rotate {
        #[arg(long, env = "ENIGMA_REGISTRY")]
        registry: Option<PathBuf>,
        #[arg(long)]
        app_key: String,
        /// Previous versions to keep (default: from config)
        #[arg(long)]
        grace: Option<usize>,
        /// Keep only this many registry backups afterwards
        #[arg(long)]
        keep_backups: Option<usize>,
        /// Print the new secret so it can be handed to the tenant
        #[arg(long)]
        show_secret: bool,
    },

    /// List tenants and secret versions
    List {
        #[arg(long, env = "ENIGMA_REGISTRY")]
        registry: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BindingArg {
    Bound,
    Unbound,
}

impl From<BindingArg> for ContextBinding {
    fn from(arg: BindingArg) -> Self {
        match arg {
            BindingArg::Bound => ContextBinding::Bound,
            BindingArg::Unbound => ContextBinding::Unbound,
        }
    }
}

fn parse_date(s: &str) -> Result<KeyDate, String> {
    KeyDate::parse(s).map_err(|e| e.to_string())
}

fn parse_secret(s: &str) -> Result<SecretString, String> {
    Ok(SecretString::from(s))
}

fn parse_version(s: &str) -> Result<SecretVersion, String> {
    s.parse::<u32>()
        .ok()
        .and_then(SecretVersion::new)
        .ok_or_else(|| format!("secret version must be a positive integer, got {s:?}"))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);
    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Derive { app_key, date, secret } => cmd_derive(&app_key, date, &secret),
        Commands::Seal { app_key, secret_version, date, secret, binding, payload } => {
            let binding = binding.map(Into::into).unwrap_or(config.client.context_binding);
            cmd_seal(&app_key, secret_version, date, &secret, binding, &payload).await
        }
        Commands::Open { app_key, registry, today, ignore_window, binding, envelope } => {
            let registry = registry.unwrap_or_else(|| config.registry.path.clone());
            let opts = OpenOptions {
                today,
                ignore_window,
                binding: binding.map(Into::into),
            };
            cmd_open(&config, &app_key, &registry, opts, &envelope).await
        }
        Commands::Send { app_key, secret_version, secret, base_url, binding, payload } => {
            let mut client_config = config.client.clone();
            if let Some(url) = base_url {
                client_config.base_url = url;
            }
            if let Some(binding) = binding {
                client_config.context_binding = binding.into();
            }
            cmd_send(&client_config, &app_key, secret_version, &secret, &payload).await
        }
        Commands::Secret { action: SecretAction::Generate } => cmd_secret_generate(),
        Commands::Secret {
            action: SecretAction::Rotate { registry, app_key, grace, keep_backups, show_secret },
        } => {
            let registry = registry.unwrap_or_else(|| config.registry.path.clone());
            let grace = grace.unwrap_or(config.registry.grace_versions);
            cmd_secret_rotate(&registry, &app_key, grace, keep_backups, show_secret).await
        }
        Commands::Secret { action: SecretAction::List { registry } } => {
            let registry = registry.unwrap_or_else(|| config.registry.path.clone());
            cmd_secret_list(&registry).await
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<EnigmaConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(EnigmaConfig::default())
    }
}

// ── Input helpers ─────────────────────────────────────────────────────────────

/// The argument itself, or all of stdin when it is `-`.
async fn read_input(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    use tokio::io::AsyncReadExt;
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("reading stdin")?;
    Ok(buf)
}

fn parse_payload(text: &str) -> Result<serde_json::Value> {
    serde_json::from_str(text).context("payload is not valid JSON")
}

fn master_secret(encoded: &SecretString) -> Result<MasterSecret> {
    let secret =
        MasterSecret::from_base64(encoded.expose_secret()).context("decoding master secret")?;
    secret.validate()?;
    Ok(secret)
}

// ── `enigma derive` ───────────────────────────────────────────────────────────

fn cmd_derive(app_key: &str, date: Option<KeyDate>, secret: &SecretString) -> Result<()> {
    let date = date.unwrap_or_else(|| SystemClock.today());
    let key = derive_key_for_date(&master_secret(secret)?, app_key, &date)?;
    println!("app key:     {app_key}");
    println!("key date:    {date}");
    println!("fingerprint: {}", key.fingerprint());
    Ok(())
}

// ── `enigma seal` ─────────────────────────────────────────────────────────────

async fn cmd_seal(
    app_key: &str,
    version: SecretVersion,
    date: Option<KeyDate>,
    secret: &SecretString,
    binding: ContextBinding,
    payload: &str,
) -> Result<()> {
    let payload = parse_payload(&read_input(payload).await?)?;
    let plaintext = serde_json::to_vec(&payload)?;
    let date = date.unwrap_or_else(|| SystemClock.today());

    let envelope = seal_payload(&master_secret(secret)?, app_key, version, date, binding, &plaintext)?;
    println!("{}", serde_json::to_string_pretty(&envelope.to_value())?);
    Ok(())
}

// ── `enigma open` ─────────────────────────────────────────────────────────────

struct OpenOptions {
    today: Option<KeyDate>,
    ignore_window: bool,
    binding: Option<ContextBinding>,
}

async fn cmd_open(
    config: &EnigmaConfig,
    app_key: &str,
    registry_path: &Path,
    opts: OpenOptions,
    envelope: &str,
) -> Result<()> {
    let body = read_input(envelope).await?;
    let payload = open_with_registry(config, app_key, registry_path, opts, body.as_bytes()).await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn open_with_registry(
    config: &EnigmaConfig,
    app_key: &str,
    registry_path: &Path,
    opts: OpenOptions,
    body: &[u8],
) -> Result<serde_json::Value> {
    let tenants = load_registry_file(registry_path).await?;
    let registry = Arc::new(SecretRegistry::from_tenants(tenants));

    let mut receiver = Receiver::from_config(registry, &config.receiver).without_key_cache();
    if let Some(today) = opts.today {
        receiver = receiver.with_clock(Arc::new(FixedClock::new(today)));
    }
    if opts.ignore_window {
        receiver = receiver.with_window(DateWindow::unbounded());
    }
    if let Some(binding) = opts.binding {
        receiver = receiver.with_binding(binding);
    }

    let (_, payload) = receiver
        .open_body(app_key, body)
        .with_context(|| format!("opening envelope for {app_key}"))?;
    Ok(payload)
}

// ── `enigma send` ─────────────────────────────────────────────────────────────

async fn cmd_send(
    client_config: &enigma_core::config::ClientConfig,
    app_key: &str,
    version: SecretVersion,
    secret: &SecretString,
    payload: &str,
) -> Result<()> {
    let payload = parse_payload(&read_input(payload).await?)?;
    let credentials = TenantCredentials::from_base64(app_key, secret, version)
        .context("loading tenant credentials")?;
    let client = EnigmaClient::new(credentials, client_config)?;

    eprintln!("sending to {}", client.endpoint());
    let response = client.send(&payload).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

// ── `enigma secret ...` ───────────────────────────────────────────────────────

fn cmd_secret_generate() -> Result<()> {
    println!("{}", MasterSecret::generate().to_base64());
    Ok(())
}

async fn cmd_secret_rotate(
    registry: &Path,
    app_key: &str,
    grace: usize,
    keep_backups: Option<usize>,
    show_secret: bool,
) -> Result<()> {
    let secret = MasterSecret::generate();
    let encoded = show_secret.then(|| secret.to_base64());

    let result = rotate_registry_file(registry, app_key, Some(secret), grace, None).await?;

    println!("Rotated {}:", result.app_key);
    println!("  active version: {}", result.new_version);
    if result.retired.is_empty() {
        println!("  retired:        none");
    } else {
        let retired: Vec<String> = result.retired.iter().map(ToString::to_string).collect();
        println!("  retired:        {}", retired.join(", "));
    }
    if let Some(backup) = &result.backup {
        println!("  backup:         {}", backup.display());
    }
    if let Some(encoded) = encoded {
        println!("  secret:         {encoded}");
    }

    if let Some(keep) = keep_backups {
        let removed = cleanup_backups(registry, keep).await?;
        if removed > 0 {
            println!("  pruned backups: {removed}");
        }
    }
    Ok(())
}

async fn cmd_secret_list(registry: &Path) -> Result<()> {
    let tenants = load_registry_file(registry).await?;
    println!("Registry: {}", registry.display());
    println!("Tenants:  {}", tenants.len());

    let mut names: Vec<&String> = tenants.keys().collect();
    names.sort();
    for name in names {
        let tenant = &tenants[name];
        let versions: Vec<String> = tenant.versions().map(|v| v.to_string()).collect();
        println!();
        println!("{name}");
        println!("  active:   {}", tenant.active_version());
        println!("  versions: {}", versions.join(", "));
    }
    Ok(())
}

// ── `enigma config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &EnigmaConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use enigma_secrets::{save_registry_file, TenantSecrets};

    const SECRET_B64: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("3").unwrap().get(), 3);
        assert!(parse_version("0").is_err());
        assert!(parse_version("-1").is_err());
        assert!(parse_version("v2").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-01-15").unwrap().to_string(), "2024-01-15");
        assert!(parse_date("2024-1-15").is_err());
    }

    #[test]
    fn test_cli_seal_args() {
        let cli = Cli::try_parse_from([
            "enigma",
            "seal",
            "--app-key",
            "app_test",
            "--version",
            "2",
            "--date",
            "2024-01-15",
            "--secret",
            SECRET_B64,
            "--binding",
            "unbound",
            "{}",
        ])
        .unwrap();
        match cli.command {
            Commands::Seal { secret_version, date, secret, binding, .. } => {
                assert_eq!(secret.expose_secret(), SECRET_B64);
                assert_eq!(secret_version.get(), 2);
                assert_eq!(date.unwrap().to_string(), "2024-01-15");
                assert!(matches!(binding, Some(BindingArg::Unbound)));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_secret_redacted_in_debug() {
        let cli = Cli::try_parse_from([
            "enigma",
            "derive",
            "--app-key",
            "app_test",
            "--secret",
            SECRET_B64,
        ])
        .unwrap();
        let rendered = format!("{:?}", cli.command);
        assert!(!rendered.contains(SECRET_B64), "secret leaked: {rendered}");
    }

    #[test]
    fn test_master_secret_rejects_short() {
        assert!(master_secret(&SecretString::from("c2hvcnQ=")).is_err());
        assert!(master_secret(&SecretString::from(SECRET_B64)).is_ok());
    }

    #[tokio::test]
    async fn test_open_with_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");

        let secret = MasterSecret::from_base64(SECRET_B64).unwrap();
        let registry = SecretRegistry::new();
        registry.upsert_tenant(
            "app_test",
            TenantSecrets::new(SecretVersion::FIRST, secret.clone()).unwrap(),
        );
        save_registry_file(&path, &registry.snapshot()).await.unwrap();

        let date = KeyDate::parse("2024-01-15").unwrap();
        let envelope = seal_payload(
            &secret,
            "app_test",
            SecretVersion::FIRST,
            date,
            ContextBinding::Bound,
            br#"{"user":42}"#,
        )
        .unwrap();
        let body = envelope.to_json_bytes();

        let config = EnigmaConfig::default();
        let opts = OpenOptions {
            today: Some(date),
            ignore_window: false,
            binding: None,
        };
        let payload = open_with_registry(&config, "app_test", &path, opts, &body)
            .await
            .unwrap();
        assert_eq!(payload["user"], 42);

        // Far outside the window unless the check is skipped
        let late = KeyDate::parse("2024-03-01").unwrap();
        let opts = OpenOptions {
            today: Some(late),
            ignore_window: false,
            binding: None,
        };
        assert!(open_with_registry(&config, "app_test", &path, opts, &body).await.is_err());
        let opts = OpenOptions {
            today: Some(late),
            ignore_window: true,
            binding: None,
        };
        assert!(open_with_registry(&config, "app_test", &path, opts, &body).await.is_ok());
    }
}
