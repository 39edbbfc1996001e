// SPDX-License-Identifier: Apache-2.0

//! Shared outbound HTTP plumbing for relays.

use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request};
use http_body_util::Full;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use super::{Error, Result};

/// A JSON POST capability with a per-request timeout. Relays must bound
/// their own network time; a stuck endpoint would otherwise stall the whole
/// scrape loop.
#[derive(Clone)]
pub struct HttpPoster {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl HttpPoster {
    pub fn new(timeout: Duration) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(https);

        Self { client, timeout }
    }

    /// POST `body` as `application/json` to `url`. Any non-2xx response is an
    /// error; the response body is not read.
    pub async fn post_json(&self, url: &str, body: Bytes) -> Result<()> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .map_err(|e| Error::Request(e.into()))?;

        let resp = tokio::time::timeout(self.timeout, self.client.request(req))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| Error::Request(e.into()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }
        Ok(())
    }
}
