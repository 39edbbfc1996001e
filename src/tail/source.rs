// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::parsers::LineParser;
use crate::record::Batch;
use crate::throttle::{ErrorDampener, ErrorKind};

use super::scanner::{self, ScanOutcome};
use super::signature::Signature;
use super::{Error, Result};

/// One watched log file, with the mutable tailing state that carries across
/// polls: the signature of the current file and the high-water mark.
pub struct LogSource {
    pub name: String,
    pub filename: PathBuf,
    parser: Arc<dyn LineParser>,
    first_line: Option<Signature>,
    last_pos: u64,
    errors: ErrorDampener,
}

impl LogSource {
    pub fn new(name: impl Into<String>, filename: impl Into<PathBuf>, parser: Arc<dyn LineParser>) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            parser,
            first_line: None,
            last_pos: 0,
            errors: ErrorDampener::new(),
        }
    }

    /// Restore tailing state persisted by a previous run.
    pub fn restore(&mut self, first_line: Option<Signature>, last_pos: u64) {
        self.first_line = first_line;
        self.last_pos = last_pos;
    }

    /// Current tailing state, for persistence.
    pub fn state(&self) -> (Option<Signature>, u64) {
        (self.first_line.clone(), self.last_pos)
    }

    /// Run one tailing pass over this source.
    ///
    /// Returns the batches produced, in emit order: when a rotation was
    /// detected and the archived predecessor drained, its batch comes first,
    /// followed by the batch scanned from the new file. Errors are logged
    /// (dampened where they repeat) and yield an empty result; the next poll
    /// retries.
    pub fn poll(&mut self) -> Vec<Batch> {
        let mut batches = Vec::new();

        let mut file = match File::open(&self.filename) {
            Ok(f) => {
                self.errors.reset(ErrorKind::FileOpen);
                f
            }
            Err(e) => {
                if self.errors.tick(ErrorKind::FileOpen) {
                    warn!(file = %self.filename.display(), error = %e, "Error opening log file");
                }
                return batches;
            }
        };

        let file_len = match file.seek(SeekFrom::End(0)) {
            Ok(n) => n,
            Err(e) => {
                warn!(file = %self.filename.display(), error = %e, "Unable to seek to end");
                return batches;
            }
        };

        if file_len < self.last_pos {
            info!(file = %self.filename.display(), "Looks like a rewind");
            match self.drain_archive() {
                Ok(Some(batch)) if !batch.is_empty() => batches.push(batch),
                Ok(_) => {}
                Err(e) => {
                    warn!(file = %self.filename.display(), error = %e, "Log roll handling failed");
                    return batches;
                }
            }
            self.last_pos = 0;
            self.first_line = None;
        }

        if self.last_pos == 0 {
            match Signature::read_from(&mut file) {
                Ok(Some(sig)) => {
                    self.first_line = Some(sig);
                    self.errors.reset(ErrorKind::Signature);
                    debug!(file = %self.filename.display(), "Saved new file signature");
                }
                Ok(None) => {
                    // Freshly created or rewound file without enough bytes to
                    // anchor yet; retry next poll.
                    if self.errors.tick(ErrorKind::Signature) {
                        warn!(file = %self.filename.display(), "File too short to save a signature");
                    }
                    return batches;
                }
                Err(e) => {
                    if self.errors.tick(ErrorKind::Signature) {
                        warn!(file = %self.filename.display(), error = %e, "Failed to save file signature");
                    }
                    return batches;
                }
            }
        }

        match scanner::scan(&mut file, self.last_pos, self.parser.as_ref()) {
            Ok(out) => {
                self.last_pos = out.end_pos;
                self.note_discarded(&out);
                if !out.records.is_empty() {
                    batches.push(out.records);
                }
            }
            Err(e) => {
                warn!(file = %self.filename.display(), error = %e, "Error reading log file");
            }
        }

        batches
    }

    /// The file shrank below the high-water mark, so the producer has rotated
    /// it. Find the archived predecessor by signature and drain the records
    /// written after our last scan. No match means the tail of the old file
    /// is lost, which is accepted.
    fn drain_archive(&mut self) -> Result<Option<Batch>> {
        let first_line = match &self.first_line {
            Some(sig) => sig.clone(),
            None => return Ok(None),
        };

        let pattern = archive_pattern(&self.filename);
        let matches = glob::glob(&pattern).map_err(|e| Error::InvalidGlob(e.to_string()))?;

        for entry in matches {
            let path = match entry {
                Ok(p) => p,
                Err(_) => continue,
            };
            let mut archive = match File::open(&path) {
                Ok(f) => f,
                Err(_) => continue,
            };
            match Signature::read_from(&mut archive) {
                Ok(Some(sig)) if sig == first_line => {
                    info!(
                        file = %self.filename.display(),
                        archive = %path.display(),
                        "Found matching archive"
                    );
                    let out = scanner::scan(&mut archive, self.last_pos, self.parser.as_ref())?;
                    self.note_discarded(&out);
                    return Ok(Some(out.records));
                }
                _ => {}
            }
        }

        Ok(None)
    }

    fn note_discarded(&self, out: &ScanOutcome) {
        if out.discarded > 0 {
            info!(
                file = %self.filename.display(),
                bytes = out.discarded,
                "Discarded unparseable bytes"
            );
        }
    }
}

/// Wildcard matching rotated siblings of the watched file: `app.log` becomes
/// `app*.log`, which covers `app.1.log`, `app.2024-01-01.log` and the live
/// file itself.
fn archive_pattern(path: &Path) -> String {
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            let glob_name = format!("{}*.{}", stem.to_string_lossy(), ext.to_string_lossy());
            match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    parent.join(glob_name).to_string_lossy().into_owned()
                }
                _ => glob_name,
            }
        }
        _ => format!("{}*", path.to_string_lossy()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::GoParser;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn go_parser() -> Arc<dyn LineParser> {
        Arc::new(GoParser::new().unwrap())
    }

    // Lines long enough that a single one exceeds the 64-byte signature.
    fn long_line(tag: &str) -> String {
        format!(
            "2015-07-15T14:53:51.979201+0200 [I] {} {}\n",
            tag,
            "x".repeat(40)
        )
    }

    fn messages(batch: &crate::record::Batch) -> Vec<String> {
        batch
            .iter()
            .map(|m| String::from_utf8_lossy(&m.message).into_owned())
            .collect()
    }

    #[test]
    fn test_poll_emits_appended_records_exactly_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, long_line("first")).unwrap();

        let mut src = LogSource::new("app", &path, go_parser());

        let batches = src.poll();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);

        // Nothing new: no batches.
        assert!(src.poll().is_empty());

        // Append one record; only it is emitted.
        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(long_line("second").as_bytes()).unwrap();
        drop(f);

        let batches = src.poll();
        assert_eq!(batches.len(), 1);
        assert!(messages(&batches[0])[0].starts_with("second"));
    }

    #[test]
    fn test_poll_short_file_awaits_signature() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "tiny\n").unwrap();

        let mut src = LogSource::new("app", &path, go_parser());

        assert!(src.poll().is_empty());
        let (sig, pos) = src.state();
        assert!(sig.is_none());
        assert_eq!(pos, 0);
    }

    #[test]
    fn test_poll_missing_file_is_quietly_skipped() {
        let dir = TempDir::new().unwrap();
        let mut src = LogSource::new("app", dir.path().join("absent.log"), go_parser());
        assert!(src.poll().is_empty());
        assert!(src.poll().is_empty());
    }

    #[test]
    fn test_poll_rotation_with_archive_recovery() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, long_line("old-1")).unwrap();

        let mut src = LogSource::new("app", &path, go_parser());
        let batches = src.poll();
        assert_eq!(batches.len(), 1);

        // Producer appends one more record, then rotates before we poll.
        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(long_line("old-2").as_bytes()).unwrap();
        drop(f);
        fs::rename(&path, dir.path().join("app.1.log")).unwrap();
        // New file with a different signature, shorter than the old
        // high-water mark so the rewind is visible.
        fs::write(&path, long_line("n1")).unwrap();

        let batches = src.poll();
        // Archive batch first, then the fresh file's batch.
        assert_eq!(batches.len(), 2);
        assert!(messages(&batches[0])[0].starts_with("old-2"));
        assert!(messages(&batches[1])[0].starts_with("n1"));
    }

    #[test]
    fn test_poll_rotation_without_archive_restarts_from_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, format!("{}{}", long_line("a"), long_line("b"))).unwrap();

        let mut src = LogSource::new("app", &path, go_parser());
        assert_eq!(src.poll().len(), 1);

        // Replace with a shorter file; the old one is gone for good.
        fs::write(&path, long_line("fresh")).unwrap();

        let batches = src.poll();
        assert_eq!(batches.len(), 1);
        assert!(messages(&batches[0])[0].starts_with("fresh"));
        let (sig, pos) = src.state();
        assert!(sig.is_some());
        assert!(pos > 0);
    }

    #[test]
    fn test_restore_resumes_past_scanned_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let first = long_line("before-restart");
        fs::write(&path, &first).unwrap();

        let mut original = LogSource::new("app", &path, go_parser());
        assert_eq!(original.poll().len(), 1);
        let (sig, pos) = original.state();

        // Simulate a restart: a new source restored from persisted state.
        let mut resumed = LogSource::new("app", &path, go_parser());
        resumed.restore(sig, pos);

        assert!(resumed.poll().is_empty());

        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(long_line("after-restart").as_bytes()).unwrap();
        drop(f);

        let batches = resumed.poll();
        assert_eq!(batches.len(), 1);
        assert!(messages(&batches[0])[0].starts_with("after-restart"));
    }

    #[test]
    fn test_archive_pattern_shapes() {
        assert_eq!(
            archive_pattern(Path::new("/var/log/app.log")),
            "/var/log/app*.log"
        );
        assert_eq!(archive_pattern(Path::new("app.log")), "app*.log");
        assert_eq!(archive_pattern(Path::new("/var/log/app")), "/var/log/app*");
    }
}
