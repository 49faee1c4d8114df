//! Daemon lifecycle: registry load, reload task, HTTP gateway, shutdown

use anyhow::{Context, Result};
use axum::http::HeaderName;
use enigma_core::config::EnigmaConfig;
use enigma_receiver::Receiver;
use enigma_secrets::store::warn_if_world_readable;
use enigma_secrets::SecretRegistry;
use std::sync::Arc;
use tracing::{info, warn};

use crate::gateway::{self, GatewayState, TracingSink};
use crate::metrics::IngestMetrics;
use crate::registry_watch;

pub async fn run(config: EnigmaConfig) -> Result<()> {
    info!("daemon starting");

    // ── Secret registry ──────────────────────────────────────────────────
    let registry_path = config.registry.path.clone();
    if config.secret_file_mode_check {
        warn_if_world_readable(&registry_path);
    }
    let registry = Arc::new(SecretRegistry::new());
    registry_watch::reload_once(&registry_path, &registry)
        .await
        .context("initial registry load")?;
    if registry.snapshot().is_empty() {
        warn!(path = %registry_path.display(), "registry has no tenants; every request will be rejected");
    }

    let metrics = Arc::new(IngestMetrics::new());

    let _watcher = if config.registry.watch {
        Some(registry_watch::spawn(
            registry_path.clone(),
            registry.clone(),
            metrics.clone(),
        )?)
    } else {
        info!("registry watch disabled; restart to pick up registry changes");
        None
    };

    // ── Receiver + gateway ───────────────────────────────────────────────
    let receiver = Receiver::from_config(registry, &config.receiver);
    info!(
        binding = ?config.receiver.context_binding,
        date_window = config.receiver.enforce_date_window,
        max_past_days = config.receiver.max_past_days,
        max_future_days = config.receiver.max_future_days,
        key_cache = config.receiver.key_cache,
        "receiver ready"
    );

    let api_key_header = HeaderName::from_bytes(config.gateway.api_key_header.as_bytes())
        .with_context(|| format!("invalid api_key_header: {}", config.gateway.api_key_header))?;
    let state = GatewayState {
        receiver: Arc::new(receiver),
        sink: Arc::new(TracingSink),
        metrics,
        api_key_header,
    };
    let app = gateway::router(&config.gateway, state);

    let listener = tokio::net::TcpListener::bind(&config.gateway.listen)
        .await
        .with_context(|| format!("binding {}", config.gateway.listen))?;

    info!(
        addr = %config.gateway.listen,
        ingest = %config.gateway.ingest_path,
        metrics = config.gateway.metrics,
        "gateway: listening"
    );

    notify_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server")?;

    info!("daemon exiting cleanly");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                let _ = tokio::signal::ctrl_c().await;
                info!("received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl-C");
    }
}

fn notify_ready() {
    // sd_notify(READY=1) when running under systemd; no-op otherwise
    #[cfg(unix)]
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}
