use enigma_core::config::ClientConfig;
use enigma_core::{Clock, ContextBinding, KeyDate, SystemClock};
use enigma_crypto::{seal_payload, Envelope};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::TenantCredentials;
use crate::error::ClientError;

/// HTTP sender bound to one tenant.
pub struct EnigmaClient {
    credentials: TenantCredentials,
    http: reqwest::Client,
    endpoint: reqwest::Url,
    api_key_header: HeaderName,
    api_key_value: HeaderValue,
    binding: ContextBinding,
    clock: Arc<dyn Clock>,
}

impl EnigmaClient {
    pub fn new(credentials: TenantCredentials, config: &ClientConfig) -> Result<Self, ClientError> {
        let endpoint = join_endpoint(&config.base_url, &config.ingest_path)?;
        let api_key_header = HeaderName::from_bytes(config.api_key_header.as_bytes())
            .map_err(|e| ClientError::Config(format!("api key header: {e}")))?;
        let api_key_value = HeaderValue::from_str(credentials.app_key())
            .map_err(|e| ClientError::Config(format!("app key is not a valid header value: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            credentials,
            http,
            endpoint,
            api_key_header,
            api_key_value,
            binding: config.context_binding,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn credentials(&self) -> &TenantCredentials {
        &self.credentials
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    /// Seal `payload` under the key for `date` without sending it.
    pub fn seal(&self, payload: &serde_json::Value, date: KeyDate) -> Result<Envelope, ClientError> {
        // serde_json's default map is ordered, so this is canonical.
        let plaintext = serde_json::to_vec(payload)?;
        let envelope = seal_payload(
            self.credentials.master_secret(),
            self.credentials.app_key(),
            self.credentials.secret_version(),
            date,
            self.binding,
            &plaintext,
        )?;
        Ok(envelope)
    }

    /// Seal `payload` under today's key and POST it to the gateway.
    ///
    /// Returns the gateway's JSON response (`Null` for an empty body). A
    /// non-2xx answer becomes [`ClientError::Status`].
    pub async fn send(&self, payload: &serde_json::Value) -> Result<serde_json::Value, ClientError> {
        let envelope = self.seal(payload, self.clock.today())?;
        let body = envelope.to_json_bytes();

        tracing::debug!(
            app_key = %self.credentials.app_key(),
            key_date = %envelope.key_date,
            secret_version = %envelope.secret_version,
            bytes = body.len(),
            endpoint = %self.endpoint,
            "sending envelope"
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(self.api_key_header.clone(), self.api_key_value.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            tracing::warn!(
                app_key = %self.credentials.app_key(),
                status = status.as_u16(),
                "ingestion rejected envelope"
            );
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for EnigmaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnigmaClient")
            .field("app_key", &self.credentials.app_key())
            .field("secret_version", &self.credentials.secret_version())
            .field("endpoint", &self.endpoint.as_str())
            .field("binding", &self.binding)
            .finish()
    }
}

fn join_endpoint(base_url: &str, ingest_path: &str) -> Result<reqwest::Url, ClientError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        ingest_path.trim_start_matches('/')
    );
    let url = reqwest::Url::parse(&joined)
        .map_err(|e| ClientError::Config(format!("invalid ingestion URL {joined}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::Config(format!("unsupported URL scheme: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enigma_core::{EnigmaError, FixedClock, SecretVersion};
    use enigma_crypto::{open_envelope, MasterSecret};
    use serde_json::json;

    fn credentials() -> TenantCredentials {
        TenantCredentials::new(
            "app_test",
            MasterSecret::from_bytes(b"0123456789abcdef0123456789abcdef".to_vec()),
            SecretVersion::FIRST,
        )
        .unwrap()
    }

    fn d(s: &str) -> KeyDate {
        KeyDate::parse(s).unwrap()
    }

    #[test]
    fn test_join_endpoint() {
        let url = join_endpoint("http://127.0.0.1:8700/", "/v1/ingest").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8700/v1/ingest");

        let url = join_endpoint("https://ingest.example.com/api", "v1/ingest").unwrap();
        assert_eq!(url.as_str(), "https://ingest.example.com/api/v1/ingest");

        assert!(matches!(
            join_endpoint("ftp://example.com", "/x"),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(join_endpoint("not a url", "/x"), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_bad_header_name() {
        let config = ClientConfig {
            api_key_header: "bad header".into(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            EnigmaClient::new(credentials(), &config),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_seal_opens_with_same_secret() {
        let client = EnigmaClient::new(credentials(), &ClientConfig::default()).unwrap();
        let payload = json!({ "user": 42, "event": "signup" });

        let envelope = client.seal(&payload, d("2024-01-15")).unwrap();
        assert_eq!(envelope.key_date, d("2024-01-15"));
        assert_eq!(envelope.secret_version, SecretVersion::FIRST);

        let plaintext = open_envelope(
            client.credentials().master_secret(),
            "app_test",
            &envelope,
            ContextBinding::Bound,
        )
        .unwrap();
        // Canonical form: keys sorted
        assert_eq!(plaintext, br#"{"event":"signup","user":42}"#);
    }

    #[test]
    fn test_seal_respects_binding() {
        let config = ClientConfig {
            context_binding: ContextBinding::Unbound,
            ..ClientConfig::default()
        };
        let client = EnigmaClient::new(credentials(), &config).unwrap();
        let envelope = client.seal(&json!({}), d("2024-01-15")).unwrap();

        let master = client.credentials().master_secret();
        assert!(open_envelope(master, "app_test", &envelope, ContextBinding::Unbound).is_ok());
        assert!(matches!(
            open_envelope(master, "app_test", &envelope, ContextBinding::Bound),
            Err(EnigmaError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn test_send_transport_error() {
        // Port 9 on localhost: nothing listens, connection is refused.
        let config = ClientConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..ClientConfig::default()
        };
        let client = EnigmaClient::new(credentials(), &config)
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(d("2024-01-15"))));
        assert!(matches!(
            client.send(&json!({})).await,
            Err(ClientError::Transport(_))
        ));
    }
}
