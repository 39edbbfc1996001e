// SPDX-License-Identifier: Apache-2.0

//! Relay fan-out.
//!
//! A relay is a destination for record batches. The scraper owns the set of
//! registered relays and hands every batch to each of them in registration
//! order, serially; one relay failing (or timing out) is logged and never
//! prevents the others from receiving the same batch. Relays do not retry
//! and keep no queue: a batch that fails to send is gone for that relay.

pub mod datadog;
pub mod http;
pub mod loggly;

use async_trait::async_trait;
use thiserror::Error;
use tower::BoxError;
use tracing::warn;

use crate::record::LogMsg;

pub use datadog::DatadogRelay;
pub use loggly::LogglyRelay;

#[derive(Error, Debug)]
pub enum Error {
    #[error("request failed: {0}")]
    Request(BoxError),

    #[error("request timed out")]
    Timeout,

    #[error("endpoint returned status {0}")]
    Status(::http::StatusCode),

    #[error("relay configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A destination endpoint for record batches.
#[async_trait]
pub trait Relay: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one batch. Implementations decide their own filtering and
    /// framing; errors are reported to the caller and otherwise swallowed.
    async fn send(&self, batch: &[LogMsg]) -> Result<()>;
}

/// Hand `batch` to every relay in registration order. Failures are logged
/// per-relay and do not stop the fan-out.
pub async fn dispatch(relays: &[Box<dyn Relay>], batch: &[LogMsg]) {
    for relay in relays {
        if let Err(e) = relay.send(batch).await {
            warn!(relay = relay.name(), error = %e, "Error posting log messages");
        }
    }
}
