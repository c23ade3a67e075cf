//! Turn attachment files into MIME parts.

use std::path::Path;

use humansize::{format_size, BINARY};
use lettre::message::header::{ContentDisposition, ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, SinglePart};

use crate::error::{Error, Result};
use crate::model::attachment::{guess_content_type, AttachmentFile, AttachmentKind};
use crate::model::draft::InlineImage;

/// Read an attachment from disk and wrap it in a part carrying
/// `Content-Disposition: attachment; filename="<basename>"`.
///
/// - text files keep their text and get `charset=utf-8`
/// - images are attached as raw bytes and the writer picks the encoding
/// - everything else is forced to base64
pub fn attachment_part(file: &AttachmentFile) -> Result<SinglePart> {
    let data = read_file(&file.path)?;
    tracing::info!(
        filename = %file.filename,
        content_type = %file.content_type,
        size = %format_size(data.len() as u64, BINARY),
        "Attaching file"
    );

    let disposition = ContentDisposition::attachment(&file.filename);

    let part = match file.kind {
        AttachmentKind::Text => {
            let content_type = parse_content_type(&format!("{}; charset=utf-8", file.content_type))?;
            SinglePart::builder()
                .header(content_type)
                .header(disposition)
                .body(decode_text(data))
        }
        AttachmentKind::Image => SinglePart::builder()
            .header(parse_content_type(&file.content_type)?)
            .header(disposition)
            .body(data),
        AttachmentKind::Binary => SinglePart::builder()
            .header(parse_content_type(&file.content_type)?)
            .header(disposition)
            .header(ContentTransferEncoding::Base64)
            .body(data),
    };

    Ok(part)
}

/// Read an image to be shown inline and tag it with its Content-ID.
pub fn inline_part(image: &InlineImage) -> Result<SinglePart> {
    let data = read_file(&image.path)?;
    let content_type = parse_content_type(&guess_content_type(&image.path))?;
    tracing::debug!(
        path = %image.path.display(),
        content_id = %image.content_id,
        "Embedding inline image"
    );
    Ok(Attachment::new_inline(image.content_id.clone()).body(data, content_type))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::io(path, e))
}

fn parse_content_type(raw: &str) -> Result<ContentType> {
    ContentType::parse(raw).map_err(|e| Error::InvalidContentType {
        content_type: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Text files are expected to be UTF-8; anything else is read as Windows-1252,
/// which maps every byte to some character.
fn decode_text(data: Vec<u8>) -> String {
    match String::from_utf8(data) {
        Ok(text) => text,
        Err(e) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            decoded.into_owned()
        }
    }
}
