use loopback_core::{InterceptorError, RelayConfig, Result, XhrDetails};
use reqwest::Method;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Performs cross-origin requests on behalf of page scripts
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    enabled: bool,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InterceptorError::Network(format!("Failed to build relay client: {}", e)))?;
        Ok(Self {
            client,
            enabled: config.enabled,
        })
    }

    /// Run the request and return the response text, or `None` on any failure
    pub async fn relay(&self, details: &XhrDetails) -> Option<String> {
        if !self.enabled {
            debug!("Relay disabled, dropping request to {}", details.url);
            return None;
        }
        warn!("Sending cross origin request to {}", details.url);

        match self.send(details).await {
            Ok(body) => Some(body),
            Err(e) => {
                debug!("Relay to {} failed: {}", details.url, e);
                None
            }
        }
    }

    async fn send(&self, details: &XhrDetails) -> Result<String> {
        let url = Url::parse(&details.url)
            .map_err(|e| InterceptorError::Network(format!("Invalid relay URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(InterceptorError::Network(format!(
                "Unsupported relay scheme: {}",
                url.scheme()
            )));
        }
        let method = Method::from_bytes(details.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| InterceptorError::Network(format!("Invalid relay method: {}", e)))?;

        let mut request = self.client.request(method, url);
        for (name, value) in &details.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = &details.payload {
            request = request.body(payload.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| InterceptorError::Network(e.to_string()))?;
        response
            .text()
            .await
            .map_err(|e| InterceptorError::Network(e.to_string()))
    }
}
