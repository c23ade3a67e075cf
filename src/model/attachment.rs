//! Attachment files and their MIME classification.
//!
//! Only the path and the guessed type are kept here. File contents are
//! read when the message is composed.

use std::path::{Path, PathBuf};

/// Type used when the extension is unknown or names a compression wrapper.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extensions that describe how a file is compressed rather than what it holds
/// (`report.tar.gz` is a gzip stream, not a tar archive).
const COMPRESSION_SUFFIXES: &[&str] = &["gz", "z", "bz2", "xz", "br"];

/// How an attachment body is written into the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// `text/*`: read as text, no base64 step.
    Text,
    /// `image/*`: read as bytes, transfer encoding left to the MIME writer.
    Image,
    /// Everything else: read as bytes and explicitly base64-encoded.
    Binary,
}

/// A file to attach, classified by its extension.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentFile {
    /// Path as given on the command line.
    pub path: PathBuf,

    /// Base name used for `Content-Disposition: attachment; filename=...`.
    pub filename: String,

    /// MIME type as `type/subtype` (e.g. `"image/png"`).
    pub content_type: String,

    /// Which body-handling branch applies.
    pub kind: AttachmentKind,
}

impl AttachmentFile {
    /// Classify `path` without touching the filesystem.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content_type = guess_content_type(path);
        let kind = kind_of(&content_type);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        Self {
            path: path.to_path_buf(),
            filename,
            content_type,
            kind,
        }
    }
}

/// Guess the MIME type of a file from its extension.
///
/// Returns [`OCTET_STREAM`] when the extension is unknown or marks a
/// compressed file.
pub fn guess_content_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    if let Some(ext) = ext.as_deref() {
        if COMPRESSION_SUFFIXES.contains(&ext) {
            return OCTET_STREAM.to_string();
        }
    }

    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

fn kind_of(content_type: &str) -> AttachmentKind {
    match content_type.split_once('/').map(|(main, _)| main) {
        Some("text") => AttachmentKind::Text,
        Some("image") => AttachmentKind::Image,
        _ => AttachmentKind::Binary,
    }
}
