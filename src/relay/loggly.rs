// SPDX-License-Identifier: Apache-2.0

//! Bulk NDJSON relay.
//!
//! Serializes the whole batch as newline-delimited JSON, one flat object per
//! record, and POSTs it in a single request to `<url>/<api-key>`. This is the
//! only place where the raw byte fields of a record become text and numbers:
//! process and thread ids are hexadecimal in the source logs, response sizes
//! are decimal, durations are decimal floats. A field that fails conversion
//! ships as its zero value rather than sinking the whole record.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::record::LogMsg;

use super::http::HttpPoster;
use super::{Relay, Result};

/// Wire timestamp layout: six fractional digits, `+0200`-style zone.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%z";

pub struct LogglyRelay {
    url: String,
    api_key: String,
    poster: HttpPoster,
}

impl LogglyRelay {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            poster: HttpPoster::new(timeout),
        }
    }

    /// Render the batch as one NDJSON buffer.
    fn encode(batch: &[LogMsg]) -> Vec<u8> {
        let mut body = Vec::with_capacity(batch.len() * 256);
        for msg in batch {
            // A record that somehow fails to serialize is dropped alone.
            if let Ok(line) = serde_json::to_vec(&BulkRecord::from_msg(msg)) {
                body.extend_from_slice(&line);
                body.push(b'\n');
            }
        }
        body
    }
}

#[async_trait]
impl Relay for LogglyRelay {
    fn name(&self) -> &str {
        "loggly"
    }

    async fn send(&self, batch: &[LogMsg]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let body = Self::encode(batch);
        let url = format!("{}/{}", self.url, self.api_key);
        self.poster.post_json(&url, Bytes::from(body)).await
    }
}

/// One flat record on the wire. Optional fields vanish when empty or zero.
#[derive(Serialize)]
struct BulkRecord<'a> {
    host: &'a str,
    ownhostname: &'a str,
    source: &'a str,
    timestamp: String,
    #[serde(skip_serializing_if = "str::is_empty")]
    severity: Cow<'a, str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    message: Cow<'a, str>,
    #[serde(skip_serializing_if = "is_zero")]
    process_id: i64,
    #[serde(skip_serializing_if = "is_zero")]
    thread_id: i64,
    #[serde(skip_serializing_if = "str::is_empty")]
    client_ip: Cow<'a, str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    request: Cow<'a, str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    response_code: Cow<'a, str>,
    #[serde(skip_serializing_if = "is_zero")]
    response_bytes: i64,
    #[serde(skip_serializing_if = "is_zero_f64")]
    response_duration: f64,
    #[serde(skip_serializing_if = "str::is_empty")]
    java_class: Cow<'a, str>,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

fn is_zero_f64(x: &f64) -> bool {
    *x == 0.0
}

fn text(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

fn hex_i64(bytes: &[u8]) -> i64 {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| i64::from_str_radix(s, 16).ok())
        .unwrap_or(0)
}

fn dec_i64(bytes: &[u8]) -> i64 {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn dec_f64(bytes: &[u8]) -> f64 {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}

impl<'a> BulkRecord<'a> {
    fn from_msg(msg: &'a LogMsg) -> Self {
        Self {
            host: &msg.host,
            ownhostname: &msg.own_hostname,
            source: &msg.source,
            timestamp: msg.time.format(TIMESTAMP_FORMAT).to_string(),
            severity: text(&msg.severity),
            message: text(&msg.message),
            process_id: hex_i64(&msg.process_id),
            thread_id: hex_i64(&msg.thread_id),
            client_ip: text(&msg.client_ip),
            request: text(&msg.request),
            response_code: text(&msg.response_code),
            // Access logs write the response size in decimal.
            response_bytes: dec_i64(&msg.response_bytes),
            response_duration: dec_f64(&msg.response_duration),
            java_class: text(&msg.java_class),
        }
    }
}
