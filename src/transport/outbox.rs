//! Dry-run transport: write each message as an `.eml` file.
//!
//! An `.eml` file is the raw RFC 5322 message exactly as it would have
//! been submitted.

use std::path::{Path, PathBuf};

use lettre::address::Envelope;
use lettre::Message;

use super::{Delivery, Transport};
use crate::error::{Error, Result};

/// Writes messages into a directory, one numbered file per send.
#[derive(Debug)]
pub struct Outbox {
    dir: PathBuf,
    written: usize,
}

impl Outbox {
    /// Create the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self { dir, written: 0 })
    }

    /// Number of messages written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Transport for Outbox {
    fn send(&mut self, message: &Message, envelope: &Envelope) -> Result<Delivery> {
        self.written += 1;
        let first = envelope
            .to()
            .first()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let path = self.dir.join(eml_filename(self.written, &first));

        std::fs::write(&path, message.formatted()).map_err(|e| Error::io(&path, e))?;
        tracing::debug!(path = %path.display(), "Wrote message to outbox");
        Ok(Delivery::Saved { path })
    }
}

/// Format: `{seq:04}_{recipient}.eml`.
fn eml_filename(seq: usize, recipient: &str) -> String {
    format!("{seq:04}_{}.eml", sanitize_filename_part(recipient, 80))
}

/// Sanitize a string for use in filenames.
///
/// Replaces invalid characters with `_` and truncates to `max_len`.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}
