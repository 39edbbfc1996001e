// SPDX-License-Identifier: Apache-2.0

//! Event relay for a Datadog-style monitor.
//!
//! Only error-grade records from non-excluded sources become events, and the
//! events API takes one POST per event. The relay is enabled when the
//! `IMQS_MONITOR` environment flag is truthy and a Datadog agent config can
//! be read at the known path; its `api_key` is required, its `hostname`
//! falls back to the machine name the same way the agent itself behaves.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::warn;

use crate::record::LogMsg;

use super::http::HttpPoster;
use super::{Error, Relay, Result};

/// Severities worth an event.
const EVENT_SEVERITIES: [&[u8]; 4] = [b"ERROR", b"E", b"FATAL", b"F"];
/// Sources whose errors are too noisy to alert on.
const EXCLUDED_SOURCES: [&str; 2] = ["www_js", "yellowfin"];

pub struct DatadogRelay {
    events_url: String,
    api_key: String,
    host: String,
    poster: HttpPoster,
}

/// Values extracted from the Datadog agent's own config file.
#[derive(Debug, PartialEq)]
pub struct AgentConfig {
    pub api_key: String,
    pub hostname: Option<String>,
}

/// Read `api_key` and `hostname` from the agent config at `path`. The format
/// is line-oriented `key: value` with `#` comments.
pub fn read_agent_config(path: impl AsRef<Path>) -> Result<AgentConfig> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut api_key = String::new();
    let mut hostname = String::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if line.starts_with("api_key:") {
            api_key = field_value(line);
        } else if line.starts_with("hostname:") {
            hostname = field_value(line);
        }
    }

    if api_key.is_empty() {
        return Err(Error::Config("no Datadog API key found".to_string()));
    }

    Ok(AgentConfig {
        api_key,
        hostname: if hostname.is_empty() { None } else { Some(hostname) },
    })
}

fn field_value(line: &str) -> String {
    line.split(':').nth(1).unwrap_or("").trim().to_string()
}

impl DatadogRelay {
    /// Build the relay from the agent config. `own_hostname` is used when the
    /// agent config does not pin a hostname.
    pub fn new(
        events_url: impl Into<String>,
        config: AgentConfig,
        own_hostname: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            events_url: events_url.into(),
            api_key: config.api_key,
            host: config.hostname.unwrap_or_else(|| own_hostname.into()),
            poster: HttpPoster::new(timeout),
        }
    }

    fn wants(msg: &LogMsg) -> bool {
        EVENT_SEVERITIES.contains(&msg.severity.as_slice())
            && !EXCLUDED_SOURCES.contains(&msg.source.as_str())
    }
}

#[async_trait]
impl Relay for DatadogRelay {
    fn name(&self) -> &str {
        "datadog"
    }

    /// The events API cannot take an array, so surviving records go out
    /// one-by-one. Acceptable, since only error-grade records survive the
    /// filter.
    async fn send(&self, batch: &[LogMsg]) -> Result<()> {
        let url = format!("{}?api_key={}", self.events_url, self.api_key);
        let mut last_err = None;

        for msg in batch.iter().filter(|m| Self::wants(m)) {
            let event = EventRecord::from_msg(msg, &self.host);
            let body = match serde_json::to_vec(&event) {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, "Unable to encode event");
                    continue;
                }
            };
            if let Err(e) = self.poster.post_json(&url, Bytes::from(body)).await {
                warn!(error = %e, "Error posting event");
                last_err = Some(e);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Serialize)]
struct EventRecord<'a> {
    host: &'a str,
    title: &'a str,
    text: std::borrow::Cow<'a, str>,
    date_happened: i64,
    alert_type: &'static str,
    aggregation_key: String,
}

impl<'a> EventRecord<'a> {
    fn from_msg(msg: &'a LogMsg, host: &'a str) -> Self {
        Self {
            host,
            title: &msg.source,
            text: String::from_utf8_lossy(&msg.message),
            date_happened: msg.time.timestamp(),
            alert_type: "error",
            aggregation_key: format!("{}:{}", msg.source, host),
        }
    }
}

/// Whether the monitor flag enables this relay. Accepts the spellings the
/// original service manager used for booleans.
pub fn monitor_enabled(value: Option<&str>) -> bool {
    matches!(
        value.map(str::trim),
        Some("1") | Some("t") | Some("T") | Some("true") | Some("TRUE") | Some("True")
    )
}
