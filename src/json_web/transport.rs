use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CACHE_CONTROL, Client, StatusCode};

use crate::error::{AuthError, AuthResult};

/// The parts of an HTTP response the certificate store cares about.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub cache_control: Option<String>,
    pub body: Vec<u8>,
}

/// Fetches documents over HTTP on behalf of the certificate store.
///
/// Deployments that need a special client (proxies, sandboxed runtimes)
/// implement this and hand it to [`crate::AppConfig::with_transport`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> AuthResult<TransportResponse>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Option<Duration>) -> AuthResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AuthError::Configuration(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> AuthResult<TransportResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::FetchFailure(e.to_string()))?;

        let status = response.status();
        let cache_control = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::FetchFailure(e.to_string()))?
            .to_vec();

        Ok(TransportResponse {
            status,
            cache_control,
            body,
        })
    }
}
