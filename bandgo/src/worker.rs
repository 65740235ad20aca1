use crate::client::HttpClient;
use crate::config::Config;
use crate::headers::HeaderRandomizer;
use anyhow::{Context, Result};
use bandgo_util::{byte_body, empty_body};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request};
use rustls::ClientConfig;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, trace};

/// Sends requests against the target until the task is torn down.
///
/// Each worker owns its client and header generator; only the configuration
/// is shared.
pub struct Worker {
    id: usize,
    config: Arc<Config>,
    client: HttpClient,
    headers: HeaderRandomizer,
}

impl Worker {
    #[must_use]
    pub fn new(id: usize, config: Arc<Config>, tls: Arc<ClientConfig>) -> Self {
        let client = HttpClient::new(config.custom_ips.clone(), tls);
        Self {
            id,
            config,
            client,
            headers: HeaderRandomizer::from_os_rng(),
        }
    }

    /// Loops forever, failed requests are dropped and the next one is sent.
    pub async fn run(mut self) -> Infallible {
        debug!(worker = self.id, "Worker started");
        loop {
            match self.fire_once().await {
                Ok(bytes) => trace!(worker = self.id, bytes, "Response drained"),
                Err(e) => {
                    trace!(worker = self.id, error = %format!("{e:#}"), "Request failed");
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// One build, send, drain round.
    pub async fn fire_once(&mut self) -> Result<u64> {
        let mut request = self.build_request().context("Failed to build request")?;
        self.headers.apply(request.headers_mut(), &self.config);
        self.client.send_discard(request).await
    }

    fn build_request(&self) -> Result<Request<Full<Bytes>>> {
        let (method, body) = match &self.config.post_body {
            Some(body) => (Method::POST, byte_body(body.clone())),
            None => (Method::GET, empty_body()),
        };
        let request = Request::builder()
            .method(method)
            .uri(self.config.target.clone())
            .body(body)?;
        Ok(request)
    }
}
