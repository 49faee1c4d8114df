use enigma_core::{EnigmaError, EnigmaResult, SecretVersion};
use enigma_crypto::MasterSecret;
use secrecy::{ExposeSecret, SecretString};

/// One tenant's sending identity. Immutable once built.
#[derive(Debug, Clone)]
pub struct TenantCredentials {
    app_key: String,
    master_secret: MasterSecret,
    secret_version: SecretVersion,
}

impl TenantCredentials {
    /// Validates eagerly so a misconfigured client fails at construction,
    /// not on its first send.
    pub fn new(
        app_key: impl Into<String>,
        master_secret: MasterSecret,
        secret_version: SecretVersion,
    ) -> EnigmaResult<Self> {
        let app_key = app_key.into();
        if app_key.is_empty() {
            return Err(EnigmaError::InvalidContext("app key is empty".into()));
        }
        master_secret.validate()?;
        Ok(Self {
            app_key,
            master_secret,
            secret_version,
        })
    }

    /// Build from a base64 secret as handed out by the operator (env var,
    /// secrets manager).
    pub fn from_base64(
        app_key: impl Into<String>,
        encoded_secret: &SecretString,
        secret_version: SecretVersion,
    ) -> EnigmaResult<Self> {
        let master = MasterSecret::from_base64(encoded_secret.expose_secret())?;
        Self::new(app_key, master, secret_version)
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    pub fn master_secret(&self) -> &MasterSecret {
        &self.master_secret
    }

    pub fn secret_version(&self) -> SecretVersion {
        self.secret_version
    }
}
