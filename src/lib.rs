// SPDX-License-Identifier: Apache-2.0

//! logship: tails service log files, parses each line into a structured
//! record, and relays batches to remote log-aggregation endpoints. Tailing
//! state is persisted so the agent resumes cleanly across restarts, and
//! rotated files are recognized by their leading byte signature.

pub mod config;
pub mod parsers;
pub mod record;
pub mod relay;
pub mod scraper;
pub mod state;
pub mod tail;
pub mod throttle;
