// SPDX-License-Identifier: Apache-2.0

//! Tailing engine.
//!
//! One [`LogSource`] per watched file. A poll opens the file, detects
//! rotation/rewind via the remembered 64-byte signature, drains the archived
//! predecessor when one can be found, and scans new bytes into a batch of
//! records. File handles never outlive a single poll, so the producing
//! process stays free to rename or delete its log on any platform.

pub mod scanner;
pub mod signature;
pub mod source;

use thiserror::Error;

pub use scanner::{scan, ScanOutcome};
pub use signature::{Signature, SIGNATURE_LEN};
pub use source::LogSource;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid archive glob pattern: {0}")]
    InvalidGlob(String),
}

pub type Result<T> = std::result::Result<T, Error>;
