// SPDX-License-Identifier: Apache-2.0

//! Service-registry configuration.
//!
//! The agent consumes the deployment's service registry document and extracts
//! one source descriptor per declared log. A registry without services is a
//! fatal configuration error; a log naming an unknown parser is reported and
//! skipped so one bad entry cannot take the whole agent down.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::parsers::ParserRegistry;
use crate::tail::LogSource;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unable to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to parse config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no services found in config file")]
    NoServices,
}

pub type Result<T> = std::result::Result<T, Error>;

/// The subset of the service registry the agent cares about.
#[derive(Debug, Deserialize)]
pub struct ServiceRegistry {
    #[serde(default)]
    services: Vec<ServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    #[serde(default)]
    logs: Vec<LogConfig>,
}

/// One declared log file: a logical name, the path to tail, and the parser
/// dialect to apply.
#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub name: String,
    pub filename: String,
    pub parser: String,
}

/// Load and validate the service registry at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<ServiceRegistry> {
    let file = File::open(path.as_ref())?;
    let registry: ServiceRegistry = serde_json::from_reader(BufReader::new(file))?;
    if registry.services.is_empty() {
        return Err(Error::NoServices);
    }
    Ok(registry)
}

impl ServiceRegistry {
    /// Resolve the declared logs into tailing sources. Logs naming a parser
    /// the registry does not know are skipped; each skip is reported in the
    /// returned error strings.
    pub fn log_sources(&self, parsers: &ParserRegistry) -> (Vec<LogSource>, Vec<String>) {
        let mut sources = Vec::new();
        let mut errors = Vec::new();

        for service in &self.services {
            for log in &service.logs {
                match parsers.get(&log.parser) {
                    Some(parser) => {
                        sources.push(LogSource::new(
                            log.name.as_str(),
                            log.filename.as_str(),
                            parser,
                        ));
                    }
                    None => {
                        errors.push(format!(
                            "{} has parser {} which cannot be found",
                            log.name, log.parser
                        ));
                    }
                }
            }
        }

        (sources, errors)
    }
}
