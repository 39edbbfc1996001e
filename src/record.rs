use chrono::{DateTime, FixedOffset};

/// A single parsed log record.
///
/// Parser-populated fields are kept as raw bytes; nothing is transcoded until
/// a relay serializes the record for the wire. The `host`, `own_hostname` and
/// `source` fields are injected by the scraper when a batch is handed to the
/// relays.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMsg {
    pub host: String,
    pub own_hostname: String,
    pub source: String,
    /// Timestamp parsed from the log line, zone preserved.
    pub time: DateTime<FixedOffset>,
    pub severity: Vec<u8>,
    pub message: Vec<u8>,
    pub process_id: Vec<u8>,
    pub thread_id: Vec<u8>,
    pub client_ip: Vec<u8>,
    pub request: Vec<u8>,
    pub response_code: Vec<u8>,
    pub response_bytes: Vec<u8>,
    pub response_duration: Vec<u8>,
    pub java_class: Vec<u8>,
}

impl LogMsg {
    /// Create an empty record carrying only a timestamp. Parsers fill in the
    /// fields their dialect provides and leave the rest empty.
    pub fn at(time: DateTime<FixedOffset>) -> Self {
        Self {
            host: String::new(),
            own_hostname: String::new(),
            source: String::new(),
            time,
            severity: Vec::new(),
            message: Vec::new(),
            process_id: Vec::new(),
            thread_id: Vec::new(),
            client_ip: Vec::new(),
            request: Vec::new(),
            response_code: Vec::new(),
            response_bytes: Vec::new(),
            response_duration: Vec::new(),
            java_class: Vec::new(),
        }
    }
}

/// The ordered set of records produced by one scan of one source. Batches are
/// handed to the relays and dropped; they are never retained across polls.
pub type Batch = Vec<LogMsg>;
