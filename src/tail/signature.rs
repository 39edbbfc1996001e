use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Number of leading bytes that identify a file across renames.
pub const SIGNATURE_LEN: usize = 64;

/// A signature identifies a file by its first 64 bytes, so the file can be
/// recognized after the producer renames it during rotation. Files shorter
/// than 64 bytes cannot be anchored and carry no signature.
///
/// Serializes as a base64 string inside the JSON state document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature {
    bytes: Vec<u8>,
}

impl Signature {
    /// Read a signature from the start of `file`, or `None` if the file holds
    /// fewer than 64 bytes. The file position is left at 0 on success.
    pub fn read_from(file: &mut File) -> io::Result<Option<Self>> {
        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; SIGNATURE_LEN];
        let mut filled = 0;
        while filled < SIGNATURE_LEN {
            match file.read(&mut buf[filled..]) {
                Ok(0) => return Ok(None),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        file.seek(SeekFrom::Start(0))?;
        Ok(Some(Self { bytes: buf.to_vec() }))
    }

    /// Build a signature from raw bytes; `None` unless exactly 64 bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() == SIGNATURE_LEN {
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl TryFrom<String> for Signature {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = BASE64
            .decode(value.as_bytes())
            .map_err(|e| format!("invalid signature encoding: {}", e))?;
        let len = bytes.len();
        Self::from_bytes(bytes)
            .ok_or_else(|| format!("signature must be {} bytes, got {}", SIGNATURE_LEN, len))
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        BASE64.encode(&sig.bytes)
    }
}
