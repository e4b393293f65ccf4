// Enrichment capabilities
//
// The pipeline treats enrichment as an opaque lookup: raw cell content in,
// enriched text out. HttpEnricher calls an external answer endpoint;
// EchoEnricher is the deterministic dev-mode/test capability.

use std::time::Duration;

use async_trait::async_trait;
use gridflow_core::{Enricher, GridflowError, Result};

/// Deterministic enricher for dev mode and tests.
///
/// Produces stable, non-empty output without any network I/O.
pub struct EchoEnricher;

#[async_trait]
impl Enricher for EchoEnricher {
    async fn enrich(&self, query: &str) -> Result<String> {
        Ok(format!("enriched: {}", query))
    }
}

/// HTTP-backed enricher calling an external answer endpoint.
///
/// Sends `GET {base_url}?q={query}` and expects a JSON body with an
/// `answer` string field; falls back to the raw body when the response is
/// not JSON. The client carries its own request timeout in addition to the
/// processor's handler deadline.
pub struct HttpEnricher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEnricher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GridflowError::enrichment(format!("client init: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn enrich(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| GridflowError::enrichment(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GridflowError::enrichment(format!(
                "upstream returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GridflowError::enrichment(format!("body read failed: {}", e)))?;

        let answer = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => json
                .get("answer")
                .and_then(|a| a.as_str())
                .map(str::to_string)
                .unwrap_or(body),
            Err(_) => body,
        };

        if answer.trim().is_empty() {
            return Err(GridflowError::enrichment("upstream returned empty answer"));
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_enricher_is_non_empty() {
        let enricher = EchoEnricher;
        let result = enricher.enrich("weather NYC").await.unwrap();
        assert!(result.contains("weather NYC"));
        assert!(!result.trim().is_empty());
    }
}
