//! TOML registry file: load, save with atomic replacement
//!
//! ```toml
//! [[tenants]]
//! app_key = "app_test"
//! active_version = 2
//!
//! [[tenants.secrets]]
//! version = 1
//! secret = "<base64>"
//!
//! [[tenants.secrets]]
//! version = 2
//! secret = "<base64>"
//! ```

use anyhow::{Context, Result};
use enigma_core::SecretVersion;
use enigma_crypto::MasterSecret;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::registry::{RegistrySnapshot, TenantSecrets};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    tenants: Vec<TenantEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TenantEntry {
    app_key: String,
    active_version: SecretVersion,
    secrets: Vec<SecretEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SecretEntry {
    version: SecretVersion,
    secret: String,
}

/// Parse registry TOML into validated tenant secrets.
pub fn parse_registry(content: &str) -> Result<HashMap<String, TenantSecrets>> {
    let file: RegistryFile = toml::from_str(content).context("parsing registry TOML")?;

    let mut tenants = HashMap::with_capacity(file.tenants.len());
    for entry in file.tenants {
        if entry.app_key.is_empty() {
            anyhow::bail!("registry entry with empty app_key");
        }

        let mut versions = BTreeMap::new();
        for s in entry.secrets {
            let secret = MasterSecret::from_base64(&s.secret)
                .with_context(|| format!("tenant {} version {}", entry.app_key, s.version))?;
            if versions.insert(s.version, secret).is_some() {
                anyhow::bail!("tenant {} lists version {} twice", entry.app_key, s.version);
            }
        }

        let secrets = TenantSecrets::from_versions(entry.active_version, versions)
            .with_context(|| format!("tenant {}", entry.app_key))?;

        if tenants.insert(entry.app_key.clone(), secrets).is_some() {
            anyhow::bail!("tenant {} listed twice", entry.app_key);
        }
    }
    Ok(tenants)
}

/// Render a snapshot back to registry TOML. Tenants are sorted by app key so
/// the file diffs cleanly.
pub fn render_registry(snapshot: &RegistrySnapshot) -> Result<String> {
    let mut tenants: Vec<TenantEntry> = snapshot
        .tenants()
        .map(|(app_key, secrets)| TenantEntry {
            app_key: app_key.to_string(),
            active_version: secrets.active_version(),
            secrets: secrets
                .iter()
                .map(|(version, secret)| SecretEntry {
                    version,
                    secret: secret.to_base64(),
                })
                .collect(),
        })
        .collect();
    tenants.sort_by(|a, b| a.app_key.cmp(&b.app_key));

    toml::to_string(&RegistryFile { tenants }).context("serializing registry TOML")
}

/// Load and validate a registry file.
pub async fn load_registry_file(path: &Path) -> Result<HashMap<String, TenantSecrets>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading registry: {}", path.display()))?;
    parse_registry(&content).with_context(|| format!("loading registry: {}", path.display()))
}

/// Write a snapshot to `path`, replacing it atomically.
pub async fn save_registry_file(path: &Path, snapshot: &RegistrySnapshot) -> Result<()> {
    let content = render_registry(snapshot)?;
    atomic_replace(path, &content).await
}

/// Atomically replace a file with new content.
///
/// Writes to a temp file in the same directory (mode 0600 on Unix), then
/// renames, so a concurrently reloading daemon never reads a partial file.
pub async fn atomic_replace(path: &Path, new_content: &str) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(&tmp_path)
        .await
        .with_context(|| format!("creating {}", tmp_path.display()))?;
    file.write_all(new_content.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("renaming into {}", path.display()))?;

    tracing::info!("registry file written: {}", path.display());
    Ok(())
}

/// Secrets files should not be readable by group/other.
pub fn warn_if_world_readable(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(path) {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    mode = format!("{:o}", mode & 0o777),
                    "registry file is accessible by other users"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SecretRegistry;

    const SAMPLE: &str = r#"
[[tenants]]
app_key = "app_test"
active_version = 2

[[tenants.secrets]]
version = 1
secret = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY="

[[tenants.secrets]]
version = 2
secret = "QUJDREVGR0hJSktMTU5PUFFSU1RVVldYWVphYmNkZWY="

[[tenants]]
app_key = "app_other"
active_version = 1

[[tenants.secrets]]
version = 1
secret = "enl4d3Z1dHNycXBvbm1sa2ppaGdmZWRjYmE5ODc2NTQ="
"#;

    fn v(n: u32) -> SecretVersion {
        SecretVersion::new(n).unwrap()
    }

    #[test]
    fn test_parse_sample() {
        let tenants = parse_registry(SAMPLE).unwrap();
        assert_eq!(tenants.len(), 2);

        let t = &tenants["app_test"];
        assert_eq!(t.active_version(), v(2));
        assert_eq!(t.versions().count(), 2);
        assert_eq!(
            t.get(v(1)).unwrap().as_bytes(),
            b"0123456789abcdef0123456789abcdef"
        );
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_registry("").unwrap().is_empty());
    }

    #[test]
    fn test_reject_missing_active() {
        let toml_str = r#"
[[tenants]]
app_key = "app_test"
active_version = 3

[[tenants.secrets]]
version = 1
secret = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY="
"#;
        assert!(parse_registry(toml_str).is_err());
    }

    #[test]
    fn test_reject_version_zero() {
        let toml_str = r#"
[[tenants]]
app_key = "app_test"
active_version = 0
secrets = []
"#;
        assert!(parse_registry(toml_str).is_err());
    }

    #[test]
    fn test_reject_short_secret() {
        let toml_str = r#"
[[tenants]]
app_key = "app_test"
active_version = 1

[[tenants.secrets]]
version = 1
secret = "c2hvcnQ="
"#;
        let err = parse_registry(toml_str).unwrap_err();
        assert!(format!("{err:#}").contains("invalid key material"));
    }

    #[test]
    fn test_reject_duplicate_tenant() {
        let doubled = format!("{SAMPLE}\n{}", &SAMPLE[SAMPLE.find("[[tenants]]\napp_key = \"app_other\"").unwrap()..]);
        assert!(parse_registry(&doubled).is_err());
    }

    #[test]
    fn test_render_parse_roundtrip() {
        let registry = SecretRegistry::from_tenants(parse_registry(SAMPLE).unwrap());
        let rendered = render_registry(&registry.snapshot()).unwrap();
        let reparsed = parse_registry(&rendered).unwrap();

        assert_eq!(reparsed.len(), 2);
        assert_eq!(reparsed["app_test"].active_version(), v(2));
        assert_eq!(
            reparsed["app_other"].get(v(1)).unwrap().as_bytes(),
            b"zyxwvutsrqponmlkjihgfedcba987654"
        );
        // Sorted by app key
        assert!(rendered.find("app_other").unwrap() < rendered.find("app_test").unwrap());
    }

    #[tokio::test]
    async fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");

        let registry = SecretRegistry::from_tenants(parse_registry(SAMPLE).unwrap());
        save_registry_file(&path, &registry.snapshot()).await.unwrap();

        let loaded = load_registry_file(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);

        // No temp file left behind
        assert!(!dir.path().join(".registry.toml.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_registry_file(&dir.path().join("absent.toml")).await.is_err());
    }
}
