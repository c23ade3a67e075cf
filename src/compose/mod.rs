//! Message assembly.
//!
//! Every message has the same skeleton, whatever the attachment count:
//!
//! ```text
//! multipart/mixed
//! ├── multipart/alternative
//! │   ├── text/plain
//! │   └── multipart/related
//! │       ├── text/html
//! │       └── (inline images)
//! └── (attachments, in the order given)
//! ```

pub mod attachment;

use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};

use crate::error::{Error, Result};
use crate::model::attachment::AttachmentFile;
use crate::model::draft::Draft;

/// Compose the draft into a ready-to-send message.
///
/// Attachment and inline-image files are read here; a missing file fails
/// the whole message.
pub fn compose(draft: &Draft) -> Result<Message> {
    tracing::info!(
        from = %draft.sender,
        to = %draft.to,
        subject = %draft.subject,
        "Creating HTML email message"
    );

    let mut builder = Message::builder()
        .from(sender_mailbox(draft)?)
        .subject(draft.subject.as_str());

    let mut any_recipient = false;
    for addr in draft.recipients() {
        builder = builder.to(parse_mailbox(addr)?);
        any_recipient = true;
    }
    if !any_recipient {
        return Err(Error::Address {
            address: draft.to.clone(),
            source: lettre::address::AddressError::MissingParts,
        });
    }

    let mut related = MultiPart::related().singlepart(SinglePart::html(draft.html.clone()));
    for image in &draft.inline_images {
        related = related.singlepart(attachment::inline_part(image)?);
    }

    let alternative = MultiPart::alternative()
        .singlepart(SinglePart::plain(draft.plain.clone()))
        .multipart(related);

    let mut mixed = MultiPart::mixed().multipart(alternative);
    for path in &draft.attachments {
        let file = AttachmentFile::from_path(path);
        mixed = mixed.singlepart(attachment::attachment_part(&file)?);
    }

    Ok(builder.multipart(mixed)?)
}

/// Parse a single address, with or without a display name.
pub fn parse_mailbox(raw: &str) -> Result<Mailbox> {
    raw.trim().parse::<Mailbox>().map_err(|source| Error::Address {
        address: raw.to_string(),
        source,
    })
}

/// Parse a bare address (`user@domain`).
pub fn parse_address(raw: &str) -> Result<Address> {
    raw.trim().parse::<Address>().map_err(|source| Error::Address {
        address: raw.to_string(),
        source,
    })
}

fn sender_mailbox(draft: &Draft) -> Result<Mailbox> {
    let email = parse_address(&draft.sender)?;
    let name = draft
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from);
    Ok(Mailbox::new(name, email))
}
