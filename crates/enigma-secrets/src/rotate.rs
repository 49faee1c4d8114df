//! Secret rotation against the registry file
//!
//! Rotation flow:
//!   1. Load and validate the current registry file
//!   2. Copy it to a timestamped backup
//!   3. Add a freshly generated secret as version `max + 1`, make it active,
//!      retire versions beyond the grace window
//!   4. Atomically replace the registry file
//!   5. Signal watchers to reload (optional)
//!
//! Clients keep working across a rotation as long as they pick up the new
//! version before their old one falls out of the grace window.

use anyhow::{Context, Result};
use enigma_core::SecretVersion;
use enigma_crypto::MasterSecret;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use crate::registry::SecretRegistry;
use crate::store::{load_registry_file, save_registry_file};

/// Result of a rotation.
#[derive(Debug)]
pub struct RotationResult {
    pub app_key: String,
    /// The version that is now active
    pub new_version: SecretVersion,
    /// Versions removed from the registry
    pub retired: Vec<SecretVersion>,
    /// Backup of the pre-rotation file, if one was written
    pub backup: Option<PathBuf>,
    /// Unix epoch seconds
    pub rotated_at: u64,
}

/// Rotate `app_key` in the registry file at `path`, keeping `grace` previous
/// versions.
///
/// `secret` defaults to a freshly generated 32-byte secret.
pub async fn rotate_registry_file(
    path: &Path,
    app_key: &str,
    secret: Option<MasterSecret>,
    grace: usize,
    reload_tx: Option<&watch::Sender<u64>>,
) -> Result<RotationResult> {
    let registry = SecretRegistry::from_tenants(load_registry_file(path).await?);

    let now = now_epoch();
    let backup_path = path.with_extension(format!("toml.bak.{now}"));
    let backup = match tokio::fs::copy(path, &backup_path).await {
        Ok(_) => {
            tracing::info!("backup created: {}", backup_path.display());
            Some(backup_path)
        }
        Err(e) => {
            tracing::warn!("backup creation failed (continuing): {e}");
            None
        }
    };

    let secret = secret.unwrap_or_else(MasterSecret::generate);
    let (new_version, retired) = registry
        .rotate(app_key, secret, grace)
        .with_context(|| format!("rotating {app_key}"))?;

    save_registry_file(path, &registry.snapshot())
        .await
        .context("writing rotated registry")?;

    if let Some(tx) = reload_tx {
        let _ = tx.send(now);
        tracing::info!("reload signal sent to registry watchers");
    }

    Ok(RotationResult {
        app_key: app_key.to_string(),
        new_version,
        retired,
        backup,
        rotated_at: now,
    })
}

/// Remove old registry backups, keeping the most recent `keep`.
pub async fn cleanup_backups(path: &Path, keep: usize) -> Result<usize> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let stem = path.file_name().unwrap_or_default().to_string_lossy();

    let mut backups: Vec<(String, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(parent).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&*stem) && name.contains(".bak.") {
            backups.push((name, entry.path()));
        }
    }

    if backups.len() <= keep {
        return Ok(0);
    }

    // Timestamp suffixes have equal width for the foreseeable future, so
    // lexical order is chronological.
    backups.sort_by(|a, b| a.0.cmp(&b.0));

    let mut removed = 0;
    for (_, backup) in backups.iter().take(backups.len() - keep) {
        match tokio::fs::remove_file(backup).await {
            Ok(()) => {
                tracing::debug!("removed old backup: {}", backup.display());
                removed += 1;
            }
            Err(e) => tracing::warn!("failed to remove backup {}: {e}", backup.display()),
        }
    }
    Ok(removed)
}

fn now_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TenantSecrets;

    async fn seed(path: &Path) {
        let registry = SecretRegistry::new();
        registry.upsert_tenant(
            "app_test",
            TenantSecrets::new(SecretVersion::FIRST, MasterSecret::from_bytes(vec![1u8; 32]))
                .unwrap(),
        );
        save_registry_file(path, &registry.snapshot()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rotate_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        seed(&path).await;

        let (tx, rx) = watch::channel(0u64);
        let result = rotate_registry_file(&path, "app_test", None, 1, Some(&tx))
            .await
            .unwrap();

        assert_eq!(result.new_version.get(), 2);
        assert!(result.retired.is_empty());
        assert!(result.backup.as_ref().unwrap().exists());
        assert_eq!(*rx.borrow(), result.rotated_at);

        let reloaded = load_registry_file(&path).await.unwrap();
        let tenant = &reloaded["app_test"];
        assert_eq!(tenant.active_version().get(), 2);
        assert_eq!(tenant.versions().count(), 2);
        assert_eq!(
            tenant.get(SecretVersion::FIRST).unwrap().as_bytes(),
            &[1u8; 32]
        );
    }

    #[tokio::test]
    async fn test_rotate_retires_beyond_grace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        seed(&path).await;

        rotate_registry_file(&path, "app_test", None, 0, None).await.unwrap();
        let reloaded = load_registry_file(&path).await.unwrap();
        assert_eq!(
            reloaded["app_test"].versions().map(|v| v.get()).collect::<Vec<_>>(),
            vec![2]
        );
    }

    #[tokio::test]
    async fn test_rotate_unknown_tenant_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        seed(&path).await;
        let before = tokio::fs::read_to_string(&path).await.unwrap();

        assert!(rotate_registry_file(&path, "nobody", None, 1, None).await.is_err());
        let after = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_cleanup_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        tokio::fs::write(&path, "").await.unwrap();
        for ts in [100, 200, 300] {
            tokio::fs::write(dir.path().join(format!("registry.toml.bak.{ts}")), "")
                .await
                .unwrap();
        }

        let removed = cleanup_backups(&path, 1).await.unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().join("registry.toml.bak.300").exists());
        assert!(!dir.path().join("registry.toml.bak.100").exists());
    }
}
