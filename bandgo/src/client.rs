use crate::dialer::Dialer;
use anyhow::{Context, Result};
use bandgo_util::drain::DiscardBodyFuture;
use bytes::Bytes;
use http_body_util::Full;
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::ClientConfig;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for one exchange, response body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// One worker's connection pool. Never shared between workers.
pub struct HttpClient {
    client: Client<Dialer, Full<Bytes>>,
}

impl HttpClient {
    #[must_use]
    pub fn new(custom_ips: Arc<[IpAddr]>, tls: Arc<ClientConfig>) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .http1_title_case_headers(true)
            .build(Dialer::new(custom_ips, tls));
        Self { client }
    }

    /// Sends the request and throws the response body away, returning its length.
    pub async fn send_discard(&self, request: Request<Full<Bytes>>) -> Result<u64> {
        tokio::time::timeout(REQUEST_TIMEOUT, self.exchange(request))
            .await
            .context("Request timed out")?
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> Result<u64> {
        let resp = self
            .client
            .request(request)
            .await
            .context("Failed to send request")?;
        DiscardBodyFuture::new(resp.into_body())
            .await
            .context("Failed to drain response body")
    }
}
