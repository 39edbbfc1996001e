// SPDX-License-Identifier: Apache-2.0

//! Dampened counters for repetitive operational errors.
//!
//! A source that cannot be opened stays broken for hours; logging every poll
//! would flood the meta-log. The dampener emits on counts 1, 2, 4, 8, 16, …
//! and resets to zero as soon as the operation succeeds again.

use std::collections::HashMap;

/// The errors that occur repeatedly enough to need dampening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The watched file could not be opened.
    FileOpen,
    /// The file is too short to capture a signature from. Common for a file
    /// that has just been rewound but is still (nearly) empty.
    Signature,
}

/// Per-source map of dampened error counts.
#[derive(Debug, Default)]
pub struct ErrorDampener {
    counts: HashMap<ErrorKind, u64>,
}

impl ErrorDampener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count for `kind` and report whether this occurrence
    /// should be logged. True exactly when the post-increment count is a
    /// power of two.
    pub fn tick(&mut self, kind: ErrorKind) -> bool {
        let count = self.counts.entry(kind).or_insert(0);
        *count += 1;
        (*count - 1) & *count == 0
    }

    /// Clear the count for `kind`; the next failure logs again.
    pub fn reset(&mut self, kind: ErrorKind) {
        self.counts.insert(kind, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_emits_on_powers_of_two() {
        let mut dampener = ErrorDampener::new();

        let emitted: Vec<u64> = (1..=32u64)
            .filter(|_| dampener.tick(ErrorKind::FileOpen))
            .collect();

        // Count values 1, 2, 4, 8, 16, 32 are the emitting occurrences.
        assert_eq!(emitted.len(), 6);
    }

    #[test]
    fn test_tick_positions() {
        let mut dampener = ErrorDampener::new();
        let mut log = Vec::new();
        for n in 1..=16u64 {
            if dampener.tick(ErrorKind::Signature) {
                log.push(n);
            }
        }
        assert_eq!(log, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_reset_restarts_emission() {
        let mut dampener = ErrorDampener::new();
        for _ in 0..5 {
            dampener.tick(ErrorKind::FileOpen);
        }
        dampener.reset(ErrorKind::FileOpen);

        // First failure after a reset logs immediately again.
        assert!(dampener.tick(ErrorKind::FileOpen));
        assert!(dampener.tick(ErrorKind::FileOpen));
        assert!(!dampener.tick(ErrorKind::FileOpen));
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut dampener = ErrorDampener::new();
        for _ in 0..3 {
            dampener.tick(ErrorKind::FileOpen);
        }
        // A different kind starts from its own count.
        assert!(dampener.tick(ErrorKind::Signature));
    }
}
