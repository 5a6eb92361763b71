pub mod reconstruct;

pub use reconstruct::{ Reconstruction, StreamOutcome, StreamReconstructor };

use futures::StreamExt;
use log::{ debug, warn };
use reqwest::Client as HttpClient;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::error::RelayError;
use crate::models::chat::Turn;
use crate::models::relay::{ ErrorBody, RelayRequestBody, RelayResponse };

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000";

/// Caller side of the relay endpoint.
#[derive(Clone)]
pub struct RelayClient {
    http: HttpClient,
    endpoint: Url,
    timeout: Duration,
}

/// Accepts either a server base URL or the full endpoint URL.
fn relay_endpoint(base_url: &str) -> Result<Url, RelayError> {
    let url = Url::parse(base_url).map_err(|e|
        RelayError::Configuration(format!("invalid relay URL '{}': {}", base_url, e))
    )?;
    if url.path().trim_end_matches('/').ends_with("/relay") {
        return Ok(url);
    }
    let mut base = url;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("relay").map_err(|e| RelayError::Configuration(e.to_string()))
}

impl RelayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        Ok(Self {
            http: HttpClient::builder().build()?,
            endpoint: relay_endpoint(base_url)?,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn complete(&self, turns: &[Turn]) -> Result<RelayResponse, RelayError> {
        let resp = self.http
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&(RelayRequestBody { messages: turns, stream: false }))
            .send().await
            .map_err(|e| if e.is_timeout() { RelayError::Timeout } else { RelayError::Http(e) })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp
                .json::<ErrorBody>().await
                .map(|body| body.error)
                .unwrap_or_else(|_| "no error body".to_string());
            return Err(RelayError::Upstream(format!("relay returned {}: {}", status, detail)));
        }

        resp.json::<RelayResponse>().await.map_err(|e| {
            RelayError::Upstream(format!("malformed relay response: {}", e))
        })
    }

    /// Streams a completion, calling `on_delta` as each fragment arrives.
    /// Always hands back a reconstruction, even when the transport fails.
    pub async fn stream<F>(&self, turns: &[Turn], mut on_delta: F) -> Reconstruction
        where F: FnMut(&str)
    {
        let mut reconstructor = StreamReconstructor::new();
        let request = self.http
            .post(self.endpoint.clone())
            .json(&(RelayRequestBody { messages: turns, stream: true }));

        let resp = match timeout(self.timeout, request.send()).await {
            Err(_) => {
                warn!("Timed out waiting for the relay");
                return reconstructor.fail("timed out waiting for the relay");
            }
            Ok(Err(e)) => {
                warn!("Relay request failed: {}", e);
                return reconstructor.fail(e.to_string());
            }
            Ok(Ok(resp)) => resp,
        };

        let status = resp.status();
        if !status.is_success() {
            warn!("Relay returned {}", status);
            return reconstructor.fail(format!("relay returned {}", status));
        }

        let mut body = resp.bytes_stream();
        loop {
            match timeout(self.timeout, body.next()).await {
                Err(_) => {
                    warn!("Relay stream stalled after {} chars", reconstructor.content().len());
                    return reconstructor.fail("relay stream stalled");
                }
                Ok(None) => {
                    return reconstructor.finish();
                }
                Ok(Some(Err(e))) => {
                    warn!("Relay stream broke off: {}", e);
                    return reconstructor.fail(e.to_string());
                }
                Ok(Some(Ok(bytes))) => {
                    for delta in reconstructor.feed(&bytes) {
                        on_delta(&delta);
                    }
                    if reconstructor.is_finished() {
                        debug!("Relay stream finished");
                        return reconstructor.finish();
                    }
                }
            }
        }
    }
}
