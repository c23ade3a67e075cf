//! The unassembled message: addresses, bodies and files to attach.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Counter mixed into generated Content-IDs so two images embedded in the
/// same nanosecond still get distinct ids.
static CID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Everything needed to compose one message.
///
/// A dispatch run keeps one template draft and derives a fresh copy per
/// recipient with [`Draft::addressed_to`].
#[derive(Debug, Clone, Default)]
pub struct Draft {
    /// Sender address (`user@domain`).
    pub sender: String,

    /// Optional display name shown in the `From:` header.
    pub display_name: Option<String>,

    /// One or more recipient addresses, comma-separated.
    pub to: String,

    pub subject: String,

    /// HTML body, placed inside the `multipart/related` container.
    pub html: String,

    /// Plain-text alternative.
    pub plain: String,

    /// Attachment paths, attached in this order.
    pub attachments: Vec<PathBuf>,

    /// Images embedded next to the HTML body and referenced by `cid:`.
    pub inline_images: Vec<InlineImage>,
}

/// An image shown inside the HTML body rather than as an attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub path: PathBuf,
    /// Content-ID without angle brackets.
    pub content_id: String,
}

impl Draft {
    /// Start a draft with the three required header values.
    pub fn new(sender: impl Into<String>, to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            to: to.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Copy of this draft with a different recipient string.
    pub fn addressed_to(&self, to: &str) -> Self {
        Self {
            to: to.to_string(),
            ..self.clone()
        }
    }

    /// Split the recipient string on commas, trimming and skipping empty entries.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        split_recipients(&self.to)
    }

    /// Embed an image next to the HTML body.
    ///
    /// Returns the generated Content-ID; reference it from HTML as
    /// `<img src="cid:ID">`.
    pub fn embed_image(&mut self, path: impl Into<PathBuf>) -> String {
        let domain = self
            .sender
            .rsplit_once('@')
            .map(|(_, d)| d)
            .filter(|d| !d.is_empty())
            .unwrap_or("localhost");
        let content_id = make_content_id(domain);
        self.inline_images.push(InlineImage {
            path: path.into(),
            content_id: content_id.clone(),
        });
        content_id
    }
}

/// Split a comma-separated address list.
pub fn split_recipients(to_csv: &str) -> impl Iterator<Item = &str> {
    to_csv.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn make_content_id(domain: &str) -> String {
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = CID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{stamp}.{}.{seq}@{domain}", std::process::id())
}
