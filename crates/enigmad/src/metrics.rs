//! Prometheus counters for the ingestion endpoint
//!
//! Exposed on `GET /metrics` of the gateway router:
//!   enigma_ingest_requests_total{outcome="accepted|unauthorized|<error code>"}
//!   enigma_registry_reloads_total{result="ok|error"}

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

type Labels = Vec<(String, String)>;

pub struct IngestMetrics {
    registry: Registry,
    requests: Family<Labels, Counter>,
    reloads: Family<Labels, Counter>,
}

impl IngestMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let requests = Family::<Labels, Counter>::default();
        let reloads = Family::<Labels, Counter>::default();

        registry.register(
            "enigma_ingest_requests",
            "Ingestion requests by outcome",
            requests.clone(),
        );
        registry.register(
            "enigma_registry_reloads",
            "Secret registry file reloads by result",
            reloads.clone(),
        );

        Self {
            registry,
            requests,
            reloads,
        }
    }

    pub fn record_request(&self, outcome: &str) {
        self.requests
            .get_or_create(&vec![("outcome".to_string(), outcome.to_string())])
            .inc();
    }

    pub fn record_reload(&self, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.reloads
            .get_or_create(&vec![("result".to_string(), result.to_string())])
            .inc();
    }

    /// Render in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = IngestMetrics::new();
        metrics.record_request("accepted");
        metrics.record_request("accepted");
        metrics.record_request("authentication_failed");
        metrics.record_reload(true);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"enigma_ingest_requests_total{outcome="accepted"} 2"#));
        assert!(text.contains(r#"enigma_ingest_requests_total{outcome="authentication_failed"} 1"#));
        assert!(text.contains(r#"enigma_registry_reloads_total{result="ok"} 1"#));
    }
}
