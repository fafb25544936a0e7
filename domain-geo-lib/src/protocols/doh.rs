//! DNS-over-HTTPS JSON API client.
//!
//! Speaks the `application/dns-json` dialect offered by public resolvers:
//! `GET <endpoint>?name=<domain>&type=1`, answer in `Answer[0].data`.

use crate::error::GeoScanError;
use crate::protocols::Resolver;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::trace;

/// Longest response excerpt kept in a parse error.
const MAX_ERROR_CONTENT: usize = 256;

/// Resolver backed by a DNS-over-HTTPS JSON endpoint.
#[derive(Clone)]
pub struct DohResolver {
    /// HTTP client shared by every request
    http_client: reqwest::Client,
    /// Endpoint URL without query string
    endpoint: String,
}

impl DohResolver {
    /// Create a resolver for `endpoint`.
    ///
    /// `timeout` is the per-attempt deadline of the pool; the HTTP client
    /// gets a little more so the pool's deadline fires first.
    pub fn new<E: Into<String>>(endpoint: E, timeout: Duration) -> Result<Self, GeoScanError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout + Duration::from_secs(2))
            .user_agent(format!("domain-geo/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                GeoScanError::network_with_source("Failed to create DoH HTTP client", e.to_string())
            })?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn query(&self, domain: &str) -> Result<String, GeoScanError> {
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[("name", domain), ("type", "1")])
            .header(ACCEPT, "application/dns-json")
            .send()
            .await
            .map_err(|e| {
                GeoScanError::network_with_source(
                    format!("DoH request for {} failed", domain),
                    e.to_string(),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoScanError::resolver_with_status(
                domain,
                format!("Resolver returned error: {}", status),
                status.as_u16(),
            ));
        }

        let body = response.text().await.map_err(|e| {
            GeoScanError::network_with_source(
                format!("Failed to read DoH response for {}", domain),
                e.to_string(),
            )
        })?;
        trace!("DoH response for {}: {}", domain, body);

        extract_answer(&body)
    }
}

impl Resolver for DohResolver {
    async fn resolve(&self, domain: &str) -> Result<String, GeoScanError> {
        self.query(domain).await
    }
}

/// Extract `Answer[0].data` from a DNS JSON response body.
///
/// A body without answers yields an empty string. A body that is not JSON
/// is a (retryable) parse error.
pub fn extract_answer(body: &str) -> Result<String, GeoScanError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| GeoScanError::ParseError {
            message: format!("Malformed DoH response: {}", e),
            content: Some(body.chars().take(MAX_ERROR_CONTENT).collect()),
        })?;

    let data = json
        .get("Answer")
        .and_then(|answers| answers.get(0))
        .and_then(|answer| answer.get("data"));

    Ok(match data {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}
