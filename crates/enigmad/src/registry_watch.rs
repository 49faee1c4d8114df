//! Registry file reload: filesystem notifications plus SIGHUP
//!
//! The registry's parent directory is watched rather than the file itself, so
//! an atomic rename over the path is seen just like an in-place write. A failed
//! reload (unreadable file, bad TOML, invalid secret) keeps the previous
//! snapshot in service and is retried on the next event.

use anyhow::{Context, Result};
use enigma_secrets::{load_registry_file, SecretRegistry};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::IngestMetrics;

/// Editors and `rsync` emit several events per save; they are coalesced.
const SETTLE: Duration = Duration::from_millis(100);

/// Load `path` and publish it as a new registry snapshot. Returns the new
/// generation.
pub async fn reload_once(path: &Path, registry: &SecretRegistry) -> Result<u64> {
    let tenants = load_registry_file(path).await?;
    let count = tenants.len();
    let generation = registry.replace(tenants);
    info!(path = %path.display(), tenants = count, generation, "registry loaded");
    Ok(generation)
}

/// Start watching `path` and reload the registry on every change.
///
/// The watcher is registered before this returns, so a write that happens
/// right after is not missed.
pub fn spawn(
    path: PathBuf,
    registry: Arc<SecretRegistry>,
    metrics: Arc<IngestMetrics>,
) -> Result<JoinHandle<()>> {
    let file_name = path
        .file_name()
        .map(OsString::from)
        .with_context(|| format!("registry path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let (tx, mut rx) = mpsc::channel(32);
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        },
        Config::default(),
    )
    .context("creating registry watcher")?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {}", dir.display()))?;

    info!(dir = %dir.display(), file = ?file_name, "watching registry for changes");

    Ok(tokio::spawn(async move {
        // Dropping the watcher stops event delivery.
        let _watcher = watcher;

        #[cfg(unix)]
        let mut hangup =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("SIGHUP handler unavailable: {e}");
                    None
                }
            };

        loop {
            #[cfg(unix)]
            let event = tokio::select! {
                event = rx.recv() => event,
                Some(()) = recv_hangup(&mut hangup) => {
                    info!("SIGHUP: reloading registry");
                    reload(&path, &registry, &metrics).await;
                    continue;
                }
            };
            #[cfg(not(unix))]
            let event = rx.recv().await;

            let Some(event) = event else {
                warn!("registry watcher closed");
                break;
            };
            if !touches(&event, &file_name) {
                continue;
            }

            tokio::time::sleep(SETTLE).await;
            while rx.try_recv().is_ok() {}

            debug!(kind = ?event.kind, "registry file changed");
            reload(&path, &registry, &metrics).await;
        }
    }))
}

async fn reload(path: &Path, registry: &SecretRegistry, metrics: &IngestMetrics) {
    match reload_once(path, registry).await {
        Ok(_) => metrics.record_reload(true),
        Err(e) => {
            warn!("registry reload failed (keeping previous snapshot): {e:#}");
            metrics.record_reload(false);
        }
    }
}

/// A create, write or rename that lands on the registry file. Renames show up
/// as `Modify(Name(_))`.
fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

#[cfg(unix)]
async fn recv_hangup(hangup: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match hangup {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enigma_core::SecretVersion;

    const ONE_TENANT: &str = r#"
[[tenants]]
app_key = "app_test"
active_version = 1

[[tenants.secrets]]
version = 1
secret = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY="
"#;

    const TWO_VERSIONS: &str = r#"
[[tenants]]
app_key = "app_test"
active_version = 2

[[tenants.secrets]]
version = 1
secret = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY="

[[tenants.secrets]]
version = 2
secret = "QUJDREVGR0hJSktMTU5PUFFSU1RVVldYWVphYmNkZWY="
"#;

    fn v(n: u32) -> SecretVersion {
        SecretVersion::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_reload_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        tokio::fs::write(&path, ONE_TENANT).await.unwrap();

        let registry = SecretRegistry::new();
        let gen1 = reload_once(&path, &registry).await.unwrap();
        assert!(registry.lookup("app_test", v(1)).is_ok());
        assert!(registry.lookup("app_test", v(2)).is_err());

        tokio::fs::write(&path, TWO_VERSIONS).await.unwrap();
        let gen2 = reload_once(&path, &registry).await.unwrap();
        assert!(gen2 > gen1);
        assert!(registry.lookup("app_test", v(2)).is_ok());
    }

    #[tokio::test]
    async fn test_bad_file_keeps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        tokio::fs::write(&path, ONE_TENANT).await.unwrap();

        let registry = SecretRegistry::new();
        let generation = reload_once(&path, &registry).await.unwrap();

        tokio::fs::write(&path, "[[tenants]]\napp_key = 7").await.unwrap();
        assert!(reload_once(&path, &registry).await.is_err());
        assert_eq!(registry.snapshot().generation(), generation);
        assert!(registry.lookup("app_test", v(1)).is_ok());
    }

    async fn wait_for_version(registry: &SecretRegistry, version: u32) -> bool {
        for _ in 0..250 {
            if registry.lookup("app_test", v(version)).is_ok() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_picks_up_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        tokio::fs::write(&path, ONE_TENANT).await.unwrap();

        let registry = Arc::new(SecretRegistry::new());
        reload_once(&path, &registry).await.unwrap();
        let metrics = Arc::new(IngestMetrics::new());
        let handle = spawn(path.clone(), registry.clone(), metrics).unwrap();

        tokio::fs::write(&path, TWO_VERSIONS).await.unwrap();

        let picked_up = wait_for_version(&registry, 2).await;
        handle.abort();
        assert!(picked_up, "watcher did not reload the changed registry");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_sees_rename_with_old_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        tokio::fs::write(&path, ONE_TENANT).await.unwrap();
        let original_mtime = std::fs::metadata(&path).unwrap().modified().unwrap();

        let registry = Arc::new(SecretRegistry::new());
        reload_once(&path, &registry).await.unwrap();
        let metrics = Arc::new(IngestMetrics::new());
        let handle = spawn(path.clone(), registry.clone(), metrics).unwrap();

        // What `rsync -a` or `cp -p` leave behind: new content, old timestamp.
        let staged = dir.path().join(".registry.toml.tmp");
        std::fs::write(&staged, TWO_VERSIONS).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&staged)
            .unwrap()
            .set_modified(original_mtime)
            .unwrap();
        std::fs::rename(&staged, &path).unwrap();

        let picked_up = wait_for_version(&registry, 2).await;
        handle.abort();
        assert!(picked_up, "rename with a preserved mtime was not reloaded");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_ignores_sibling_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        tokio::fs::write(&path, ONE_TENANT).await.unwrap();

        let registry = Arc::new(SecretRegistry::new());
        let generation = reload_once(&path, &registry).await.unwrap();
        let metrics = Arc::new(IngestMetrics::new());
        let handle = spawn(path.clone(), registry.clone(), metrics).unwrap();

        tokio::fs::write(dir.path().join("notes.txt"), "unrelated")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.abort();
        assert_eq!(registry.snapshot().generation(), generation);
    }

    #[test]
    fn test_touches_filters_kind_and_name() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};

        let name = OsString::from("registry.toml");
        let event = |kind, path: &str| Event::new(kind).add_path(PathBuf::from(path));

        assert!(touches(
            &event(EventKind::Create(CreateKind::File), "/etc/enigma/registry.toml"),
            &name
        ));
        assert!(touches(
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                "/etc/enigma/registry.toml"
            ),
            &name
        ));
        assert!(!touches(
            &event(EventKind::Remove(RemoveKind::File), "/etc/enigma/registry.toml"),
            &name
        ));
        assert!(!touches(
            &event(EventKind::Create(CreateKind::File), "/etc/enigma/other.toml"),
            &name
        ));
    }
}
