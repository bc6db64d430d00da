use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use reqwest::Url;

use crate::error::GatewayError;

/// HTTP client for the auth service.
///
/// The inbound body is handed over as a stream, chunk by chunk, so the
/// gateway never buffers a full submission and never inspects its bytes.
/// The auth service always takes `GET` regardless of the inbound verb.
#[derive(Clone)]
pub struct AuthClient {
    base_url: Url,
    client: reqwest::Client,
}

impl AuthClient {
    /// Build a client for the auth service at `base_url`.
    ///
    /// `timeout` bounds both connection establishment and the full
    /// exchange; an unreachable auth service surfaces as an error instead
    /// of a request that never completes.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url).map_err(|_| GatewayError::Internal)?;
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|_| GatewayError::Internal)?;
        Ok(Self { base_url, client })
    }

    /// Stream `body` to the auth service at `path` and return the status
    /// it answered with. Resolves once the status line is in; the response
    /// body carries nothing of interest.
    pub async fn forward(&self, path: &str, body: Body) -> Result<StatusCode, GatewayError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| GatewayError::Internal)?;
        let response = self
            .client
            .get(url)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await?;
        Ok(response.status())
    }
}
