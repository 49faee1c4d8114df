use enigma_core::EnigmaError;

/// Errors surfaced by [`EnigmaClient`](crate::EnigmaClient).
///
/// None of these are retried by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("crypto: {0}")]
    Crypto(#[from] EnigmaError),

    #[error("serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status.
    #[error("ingestion rejected with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Gateway error code from a JSON error body, e.g. `unknown_secret_version`.
    pub fn rejection_code(&self) -> Option<String> {
        let Self::Status { body, .. } = self else {
            return None;
        };
        serde_json::from_str::<serde_json::Value>(body)
            .ok()?
            .get("error")?
            .as_str()
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_code() {
        let err = ClientError::Status {
            status: 409,
            body: r#"{"error":"unknown_secret_version"}"#.into(),
        };
        assert_eq!(err.rejection_code().as_deref(), Some("unknown_secret_version"));

        let plain = ClientError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(plain.rejection_code(), None);
        assert_eq!(ClientError::Config("x".into()).rejection_code(), None);
    }

    #[test]
    fn test_crypto_conversion() {
        let err: ClientError = EnigmaError::AuthenticationFailed.into();
        assert!(matches!(err, ClientError::Crypto(EnigmaError::AuthenticationFailed)));
    }
}
