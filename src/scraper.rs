// SPDX-License-Identifier: Apache-2.0

//! The scrape loop.
//!
//! A single scraper owns the sources and the relays and drives everything
//! sequentially: each poll visits the sources in registration order, scans
//! them, stamps host identity onto the records, fans each batch out to every
//! relay, then persists the high-water marks and sleeps. Nothing in the loop
//! runs concurrently, which keeps per-file record order strictly monotonic
//! and leaves no shared state to race on. A slow relay stalls the whole
//! cycle; relays bound their own request time.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::relay::{self, Relay};
use crate::state::{self, SourceState, StateFile};
use crate::tail::LogSource;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct Scraper {
    sources: Vec<LogSource>,
    relays: Vec<Box<dyn Relay>>,
    hostname: String,
    own_hostname: String,
    state_filename: Option<PathBuf>,
    poll_interval: Duration,
}

impl Scraper {
    pub fn new(
        hostname: impl Into<String>,
        own_hostname: impl Into<String>,
        state_filename: Option<PathBuf>,
    ) -> Self {
        Self {
            sources: Vec::new(),
            relays: Vec::new(),
            hostname: hostname.into(),
            own_hostname: own_hostname.into(),
            state_filename,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn add_source(&mut self, source: LogSource) {
        info!(source = %source.name, file = %source.filename.display(), "Source loaded");
        self.sources.push(source);
    }

    /// Register a relay. Batches reach relays in registration order.
    pub fn add_relay(&mut self, relay: Box<dyn Relay>) {
        info!(relay = relay.name(), "Relay registered");
        self.relays.push(relay);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Run until `cancel` fires. On shutdown the current poll finishes, state
    /// is saved, and the loop exits before the next sleep.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!("Scraper starting");
        self.load_state();
        loop {
            self.poll_once().await;
            self.save_state();
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
        info!("Scraper exiting");
    }

    /// One pass over all sources.
    pub async fn poll_once(&mut self) {
        for i in 0..self.sources.len() {
            let batches = self.sources[i].poll();
            let source_name = self.sources[i].name.clone();
            for mut batch in batches {
                for msg in &mut batch {
                    msg.host = self.hostname.clone();
                    msg.own_hostname = self.own_hostname.clone();
                    msg.source = source_name.clone();
                }
                debug!(source = %source_name, records = batch.len(), "Scanned batch");
                relay::dispatch(&self.relays, &batch).await;
            }
        }
    }

    /// Restore high-water marks from the state file. A missing or corrupt
    /// file just means every source rescans from zero.
    pub fn load_state(&mut self) {
        let Some(path) = &self.state_filename else {
            return;
        };

        let loaded = match state::load(path) {
            Ok(s) => s,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Unable to read state file");
                return;
            }
        };

        for source in &mut self.sources {
            let key = source.filename.to_string_lossy();
            if let Some(entry) = loaded.sources.get(key.as_ref()) {
                source.restore(entry.first_line.clone(), entry.last_pos);
            }
        }
    }

    /// Persist the current high-water marks. Failures are logged and the next
    /// poll retries.
    pub fn save_state(&self) {
        let Some(path) = &self.state_filename else {
            return;
        };

        let mut doc = StateFile::default();
        for source in &self.sources {
            let (first_line, last_pos) = source.state();
            doc.sources.insert(
                source.filename.to_string_lossy().into_owned(),
                SourceState {
                    first_line,
                    last_pos,
                },
            );
        }

        if let Err(e) = state::save(path, &doc) {
            warn!(file = %path.display(), error = %e, "Error writing state file");
        }
    }
}
