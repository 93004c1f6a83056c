use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::ProbeError;
use crate::types::RequestSpec;

/// Raw outcome of the transport half of a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    /// HTTP status code
    pub status: u16,

    /// Full response body, empty for non-success responses
    pub body: Vec<u8>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport used by the executor to perform one request
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Send the request and read the complete response body
    async fn fetch(
        &self,
        target: &Url,
        request: &RequestSpec,
        timeout: Duration,
    ) -> Result<ProbeResponse, ProbeError>;
}

/// reqwest-backed prober
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("netpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        Ok(Self::with_client(client))
    }

    /// Prober over a caller-configured client (proxies, TLS roots)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn fetch(
        &self,
        target: &Url,
        request: &RequestSpec,
        timeout: Duration,
    ) -> Result<ProbeResponse, ProbeError> {
        let mut http_request = self
            .client
            .request(request.method.into(), target.clone())
            .timeout(timeout)
            .header(reqwest::header::CACHE_CONTROL, "no-cache");

        for (key, value) in &request.headers {
            http_request = http_request.header(key, value);
        }

        if let Some(body) = &request.body {
            http_request = http_request.body(body.clone());
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(e, timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            debug!(url = %target, status, "Probe returned non-success status");
            return Ok(ProbeResponse { status, body: Vec::new() });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProbeError::from_reqwest(e, timeout))?;

        Ok(ProbeResponse { status, body: body.to_vec() })
    }
}
