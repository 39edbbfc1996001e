// SPDX-License-Identifier: Apache-2.0

//! Line parsers for the supported log dialects.
//!
//! Each parser owns one compiled regular expression and turns a single raw
//! line into a [`LogMsg`]. Parsers never perform I/O and never look at more
//! than one line; a line that does not match the dialect (or carries an
//! unparseable timestamp) yields `None`, which the scanner folds into the
//! preceding record as a multi-line continuation.
//!
//! Regexes operate on bytes so that lines with invalid UTF-8 still scan; only
//! the timestamp capture is required to be valid UTF-8.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use regex::bytes::Regex;
use thiserror::Error;

use crate::record::LogMsg;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid log pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Timestamp with six fractional digits and a `+0200`-style zone.
const TIME_MICROS: &str = "%Y-%m-%dT%H:%M:%S%.6f%z";
/// Same, with a `+02:00`-style zone.
const TIME_MICROS_COLON: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";
const TIME_JAVA: &str = "%Y-%m-%d %H:%M:%S%.3f %z";
const TIME_ACCESS: &str = "%d/%b/%Y:%H:%M:%S %z";
/// Zone-less timestamp, interpreted in the machine's local zone.
const TIME_YELLOWFIN: &str = "%Y-%m-%d %H:%M:%S";

/// A per-dialect line parser: one raw line in, one record or `None` out.
pub trait LineParser: Send + Sync {
    fn parse(&self, line: &[u8]) -> Option<LogMsg>;
}

/// The fixed set of parsers, resolved by the names used in the service
/// registry document. Construction compiles every pattern, so a malformed
/// pattern fails at startup rather than on first use.
pub struct ParserRegistry {
    by_name: HashMap<&'static str, Arc<dyn LineParser>>,
}

impl ParserRegistry {
    pub fn new() -> Result<Self> {
        let mut by_name: HashMap<&'static str, Arc<dyn LineParser>> = HashMap::new();
        by_name.insert("go", Arc::new(GoParser::new()?));
        by_name.insert("spd", Arc::new(SpdParser::new()?));
        by_name.insert("albion", Arc::new(AlbionParser::new()?));
        by_name.insert("router", Arc::new(RouterParser::new()?));
        by_name.insert("java", Arc::new(JavaParser::new()?));
        by_name.insert("yellowfin", Arc::new(YellowfinParser::new()?));
        Ok(Self { by_name })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LineParser>> {
        self.by_name.get(name).cloned()
    }
}

fn utf8(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok()
}

/// Parse a microsecond timestamp, accepting both `+0200` and `+02:00` zones.
fn parse_micro_time(bytes: &[u8]) -> Option<DateTime<FixedOffset>> {
    let s = utf8(bytes)?;
    DateTime::parse_from_str(s, TIME_MICROS)
        .or_else(|_| DateTime::parse_from_str(s, TIME_MICROS_COLON))
        .ok()
}

/// Service log: `2015-07-15T14:53:51.979201+0200 [I] Service: Starting`
pub struct GoParser {
    regex: Regex,
}

impl GoParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            regex: Regex::new(
                r"(?-u)(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}\S+) \[([A-Z])\] (.*)",
            )?,
        })
    }
}

impl LineParser for GoParser {
    fn parse(&self, line: &[u8]) -> Option<LogMsg> {
        let caps = self.regex.captures(line)?;
        let time = parse_micro_time(caps.get(1)?.as_bytes())?;
        let mut msg = LogMsg::at(time);
        msg.severity = caps.get(2)?.as_bytes().to_vec();
        msg.message = caps.get(3)?.as_bytes().to_vec();
        Some(msg)
    }
}

/// spdlog: `2016-09-27T15:57:19.166825+02:00 [I] 22452 hello`
pub struct SpdParser {
    regex: Regex,
}

impl SpdParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            regex: Regex::new(
                r"(?-u)(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}\S+) \[([A-Z])\] ([0-9]+) (.*)",
            )?,
        })
    }
}

impl LineParser for SpdParser {
    fn parse(&self, line: &[u8]) -> Option<LogMsg> {
        let caps = self.regex.captures(line)?;
        let time = parse_micro_time(caps.get(1)?.as_bytes())?;
        let mut msg = LogMsg::at(time);
        msg.severity = caps.get(2)?.as_bytes().to_vec();
        msg.thread_id = caps.get(3)?.as_bytes().to_vec();
        msg.message = caps.get(4)?.as_bytes().to_vec();
        Some(msg)
    }
}

/// Albion service log: `2015-07-15T14:53:51.979201+0200 [I] 00001fdc Service: Starting`
pub struct AlbionParser {
    regex: Regex,
}

impl AlbionParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            regex: Regex::new(
                r"(?-u)(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}\S+) \[([A-Z])\] ([0-9a-zA-Z]{8}) (.*)",
            )?,
        })
    }
}

impl LineParser for AlbionParser {
    fn parse(&self, line: &[u8]) -> Option<LogMsg> {
        let caps = self.regex.captures(line)?;
        let time = parse_micro_time(caps.get(1)?.as_bytes())?;
        let mut msg = LogMsg::at(time);
        msg.severity = caps.get(2)?.as_bytes().to_vec();
        msg.process_id = caps.get(3)?.as_bytes().to_vec();
        msg.message = caps.get(4)?.as_bytes().to_vec();
        Some(msg)
    }
}

/// log4j-style line:
/// `INFO 2015-07-30 10:34:49.196 +0200 [pool-1-thread-1] org.eclipse.jetty.server.Server  jetty - 9.0.2.v20130417`
///
/// The thread and message-id captures are matched but not carried on the
/// record. The `(\S*)` message-id may match empty and the separator assumes
/// exactly two spaces; kept as-is until the producer format is re-confirmed.
pub struct JavaParser {
    regex: Regex,
}

impl JavaParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            regex: Regex::new(
                r"(?-u)(\S+)\s+(\d{4}-\d{2}-\d{2} \S+ \S+) (\S+)\s(\S*)\s\s(\S+)\s-\s(.*)",
            )?,
        })
    }
}

impl LineParser for JavaParser {
    fn parse(&self, line: &[u8]) -> Option<LogMsg> {
        let caps = self.regex.captures(line)?;
        let s = utf8(caps.get(2)?.as_bytes())?;
        let time = DateTime::parse_from_str(s, TIME_JAVA).ok()?;
        let mut msg = LogMsg::at(time);
        msg.severity = caps.get(1)?.as_bytes().to_vec();
        msg.java_class = caps.get(5)?.as_bytes().to_vec();
        msg.message = caps.get(6)?.as_bytes().to_vec();
        Some(msg)
    }
}

/// Access log with a trailing request duration:
/// `127.0.0.1 - - [27/Jul/2015:15:15:45 +0200] "GET /a HTTP/1.1" 200 62223 3.8250`
pub struct RouterParser {
    regex: Regex,
}

impl RouterParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            regex: Regex::new(r#"(?-u)(\S+) (\S+) (\S+) \[([^\]]+)\] "([^"]+)" (\S+) (\S+) (\S+)"#)?,
        })
    }
}

impl LineParser for RouterParser {
    fn parse(&self, line: &[u8]) -> Option<LogMsg> {
        let caps = self.regex.captures(line)?;
        let s = utf8(caps.get(4)?.as_bytes())?;
        let time = DateTime::parse_from_str(s, TIME_ACCESS).ok()?;
        let mut msg = LogMsg::at(time);
        msg.client_ip = caps.get(1)?.as_bytes().to_vec();
        msg.request = caps.get(5)?.as_bytes().to_vec();
        msg.response_code = caps.get(6)?.as_bytes().to_vec();
        msg.response_bytes = caps.get(7)?.as_bytes().to_vec();
        msg.response_duration = caps.get(8)?.as_bytes().to_vec();
        Some(msg)
    }
}

/// Yellowfin report server log. The timestamp carries no zone and is taken
/// to be local time; the severity capture includes surrounding whitespace
/// and is the only field that gets trimmed.
pub struct YellowfinParser {
    regex: Regex,
}

impl YellowfinParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            regex: Regex::new(
                r"(?-u)(\S+):(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}):(\s*\s*\S+)\s+(.*)",
            )?,
        })
    }
}

impl LineParser for YellowfinParser {
    fn parse(&self, line: &[u8]) -> Option<LogMsg> {
        let caps = self.regex.captures(line)?;
        let s = utf8(caps.get(2)?.as_bytes())?;
        let naive = NaiveDateTime::parse_from_str(s, TIME_YELLOWFIN).ok()?;
        let time = Local.from_local_datetime(&naive).single()?.fixed_offset();
        let mut msg = LogMsg::at(time);
        msg.severity = caps.get(3)?.as_bytes().trim_ascii().to_vec();
        msg.message = caps.get(4)?.as_bytes().to_vec();
        Some(msg)
    }
}
