// SPDX-License-Identifier: Apache-2.0

//! Line scanner with multi-line folding.
//!
//! Scans a file from a byte offset to EOF, feeding each complete line to the
//! source's parser. Lines the parser rejects are buffered and appended to the
//! message of the preceding record, which is how stack traces and other
//! multi-line payloads stay attached to their header line. Continuation bytes
//! that arrive before any parseable record are discarded and tallied.
//!
//! The returned end position only ever advances past LF-terminated lines; a
//! half-written trailing line is left for the next poll to re-read.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};

use crate::parsers::LineParser;
use crate::record::LogMsg;

use super::Result;

/// Outcome of one scan pass over one file.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Parsed records in file order, continuations folded in.
    pub records: Vec<LogMsg>,
    /// Byte offset just past the LF of the last complete line consumed.
    pub end_pos: u64,
    /// Total continuation bytes dropped because no record preceded them.
    pub discarded: usize,
}

/// Scan `file` from `start` to EOF with `parser`.
pub fn scan(file: &mut File, start: u64, parser: &dyn LineParser) -> Result<ScanOutcome> {
    file.seek(SeekFrom::Start(start))?;
    let mut reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut pending: Option<LogMsg> = None;
    // Unparseable lines, buffered until the next parseable record claims them.
    let mut extra: Vec<u8> = Vec::new();
    let mut discarded = 0usize;
    let mut end_pos = start;
    let mut buf: Vec<u8> = Vec::with_capacity(1024);

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            // Half-written trailing line; the next poll re-reads it.
            break;
        }
        end_pos += n as u64;

        // Copy the line out of the reusable read buffer before parsing, so a
        // record never aliases bytes the next iteration will overwrite.
        let line = trim_line(&buf).to_vec();

        match parser.parse(&line) {
            Some(msg) => {
                if let Some(mut prev) = pending.take() {
                    prev.message.extend_from_slice(&extra);
                    records.push(prev);
                } else {
                    discarded += extra.len();
                }
                extra.clear();
                pending = Some(msg);
            }
            None => {
                extra.push(b'\n');
                extra.extend_from_slice(&line);
            }
        }
    }

    if let Some(mut prev) = pending.take() {
        prev.message.extend_from_slice(&extra);
        records.push(prev);
        extra.clear();
    }
    if !extra.is_empty() {
        discarded += extra.len();
    }

    Ok(ScanOutcome {
        records,
        end_pos,
        discarded,
    })
}

/// Strip the line terminator (LF, optionally preceded by CR).
fn trim_line(buf: &[u8]) -> &[u8] {
    let mut line = buf;
    if line.last() == Some(&b'\n') {
        line = &line[..line.len() - 1];
    }
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::GoParser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn go_line(msg: &str) -> String {
        format!("2015-07-15T14:53:51.979201+0200 [I] {}\n", msg)
    }

    #[test]
    fn test_scan_parses_lines_in_order() {
        let content = format!("{}{}{}", go_line("one"), go_line("two"), go_line("three"));
        let file = write_file(content.as_bytes());
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        let messages: Vec<&[u8]> = out.records.iter().map(|m| m.message.as_slice()).collect();
        assert_eq!(messages, vec![b"one" as &[u8], b"two", b"three"]);
        assert_eq!(out.end_pos, content.len() as u64);
        assert_eq!(out.discarded, 0);
    }

    #[test]
    fn test_scan_folds_continuation_lines() {
        let content = format!(
            "{}stack line 1\nstack line 2\n{}",
            go_line("boom"),
            go_line("next")
        );
        let file = write_file(content.as_bytes());
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].message, b"boom\nstack line 1\nstack line 2");
        assert_eq!(out.records[1].message, b"next");
        assert_eq!(out.discarded, 0);
    }

    #[test]
    fn test_scan_folds_four_line_trace_between_two_records() {
        let trace = "  at a\n  at b\n  at c\n  at d\n";
        let content = format!("{}{}{}", go_line("head"), trace, go_line("tail"));
        let file = write_file(content.as_bytes());
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        assert_eq!(out.records.len(), 2);
        assert_eq!(
            out.records[0].message,
            b"head\n  at a\n  at b\n  at c\n  at d"
        );
    }

    #[test]
    fn test_scan_discards_leading_continuations() {
        let content = format!("orphan junk\n{}", go_line("real"));
        let file = write_file(content.as_bytes());
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].message, b"real");
        // "\n" + "orphan junk"
        assert_eq!(out.discarded, 12);
    }

    #[test]
    fn test_scan_discards_trailing_continuations_without_record() {
        let file = write_file(b"junk one\njunk two\n");
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        assert!(out.records.is_empty());
        assert_eq!(out.discarded, 18);
        assert_eq!(out.end_pos, 18);
    }

    #[test]
    fn test_scan_appends_trailing_continuation_to_last_record() {
        let content = format!("{}tail junk\n", go_line("last"));
        let file = write_file(content.as_bytes());
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].message, b"last\ntail junk");
    }

    #[test]
    fn test_scan_leaves_half_line_for_next_poll() {
        let complete = go_line("done");
        let content = format!("{}2015-07-15T14:53:52.000", complete);
        let file = write_file(content.as_bytes());
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.end_pos, complete.len() as u64);
    }

    #[test]
    fn test_scan_from_offset_skips_prior_lines() {
        let first = go_line("seen");
        let content = format!("{}{}", first, go_line("new"));
        let file = write_file(content.as_bytes());
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), first.len() as u64, &parser).unwrap();

        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].message, b"new");
        assert_eq!(out.end_pos, content.len() as u64);
    }

    #[test]
    fn test_scan_strips_crlf() {
        let content = "2015-07-15T14:53:51.979201+0200 [I] windows\r\n";
        let file = write_file(content.as_bytes());
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        assert_eq!(out.records[0].message, b"windows");
        assert_eq!(out.end_pos, content.len() as u64);
    }

    #[test]
    fn test_scan_copies_lines_out_of_reader_buffer() {
        // Two records larger than the reader's refill granularity would
        // corrupt each other if the scanner handed out aliases of its
        // internal buffer; assert both survive with distinct content.
        let content = format!("{}{}", go_line(&"a".repeat(2000)), go_line(&"b".repeat(2000)));
        let file = write_file(content.as_bytes());
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        assert_eq!(out.records[0].message, "a".repeat(2000).as_bytes());
        assert_eq!(out.records[1].message, "b".repeat(2000).as_bytes());
    }

    #[test]
    fn test_scan_empty_file() {
        let file = write_file(b"");
        let parser = GoParser::new().unwrap();

        let out = scan(&mut file.reopen().unwrap(), 0, &parser).unwrap();

        assert!(out.records.is_empty());
        assert_eq!(out.end_pos, 0);
        assert_eq!(out.discarded, 0);
    }
}
