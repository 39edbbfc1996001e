// SPDX-License-Identifier: Apache-2.0

//! Persistent tailing state.
//!
//! A single JSON document maps each watched filename to its signature and
//! high-water mark. It is loaded once at startup and rewritten in full after
//! every poll cycle. Writes go to a sibling temp file followed by a rename,
//! so a crash mid-write leaves either the previous or the new document on
//! disk, never a truncated one. Losing the state entirely is safe: sources
//! rescan from zero and downstream accepts at-least-once delivery.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tail::Signature;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The persisted document. Field names match the state files written by
/// earlier deployments of the agent, so an upgrade resumes where the old
/// binary left off.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(rename = "Sources", default)]
    pub sources: HashMap<String, SourceState>,
}

/// Tailing state for a single source, keyed by filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceState {
    #[serde(rename = "FirstLine")]
    pub first_line: Option<Signature>,
    #[serde(rename = "LastPos")]
    pub last_pos: u64,
}

/// Load the state document at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<StateFile> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Write the state document to `path` atomically (temp file + rename).
pub fn save(path: impl AsRef<Path>, state: &StateFile) -> Result<()> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    // Unique temp name so two processes pointed at the same state file do not
    // clobber each other's half-written temp.
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let file = File::create(&temp_path)?;
    set_world_writable(&file)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, state)?;
    writer.flush()?;
    drop(writer);

    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn set_world_writable(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o666))
}

#[cfg(not(unix))]
fn set_world_writable(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tail::SIGNATURE_LEN;
    use tempfile::tempdir;

    fn sample_state() -> StateFile {
        let mut state = StateFile::default();
        state.sources.insert(
            "/var/log/app.log".to_string(),
            SourceState {
                first_line: Signature::from_bytes(vec![9u8; SIGNATURE_LEN]),
                last_pos: 500,
            },
        );
        state.sources.insert(
            "/var/log/empty.log".to_string(),
            SourceState {
                first_line: None,
                last_pos: 0,
            },
        );
        state
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        save(&path, &sample_state()).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.sources.len(), 2);
        let entry = &loaded.sources["/var/log/app.log"];
        assert_eq!(entry.last_pos, 500);
        assert_eq!(
            entry.first_line.as_ref().unwrap().bytes(),
            &[9u8; SIGNATURE_LEN]
        );
        assert!(loaded.sources["/var/log/empty.log"].first_line.is_none());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        save(&path, &sample_state()).unwrap();
        save(&path, &sample_state()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("state.json")]);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempdir().unwrap();
        assert!(load(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_load_corrupt_file_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{\"Sources\": {").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/state.json");
        save(&path, &StateFile::default()).unwrap();
        assert!(load(&path).unwrap().sources.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_permissive_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        save(&path, &StateFile::default()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o666);
    }
}
