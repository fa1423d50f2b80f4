//! Binary attachments and their archive entry names.
//!
//! Attachments are stored in the archive as `attachments/<uuid>.<ext>`, the
//! extension derived from the MIME type at save time and mapped back on
//! load.

use crate::id::AttachmentId;
use winnow::combinator::{preceded, separated_pair};
use winnow::prelude::*;
use winnow::token::take_while;

pub const ATTACHMENT_DIR: &str = "attachments/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_svg(&self) -> bool {
        self.mime == "image/svg+xml"
    }
}

const MIME_TABLE: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/bmp", "bmp"),
    ("image/svg+xml", "svg"),
    ("application/pdf", "pdf"),
    ("text/plain", "txt"),
    ("application/json", "json"),
];

/// File extension for a MIME type; unknown types fall back to `bin`.
pub fn extension_for_mime(mime: &str) -> &'static str {
    MIME_TABLE
        .iter()
        .find(|(m, _)| m.eq_ignore_ascii_case(mime))
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

/// MIME type for an extension; unknown extensions map to
/// `application/octet-stream`.
pub fn mime_for_extension(ext: &str) -> &'static str {
    if ext.eq_ignore_ascii_case("jpeg") {
        return "image/jpeg";
    }
    MIME_TABLE
        .iter()
        .find(|(_, e)| e.eq_ignore_ascii_case(ext))
        .map(|(m, _)| *m)
        .unwrap_or("application/octet-stream")
}

pub fn entry_name(id: AttachmentId, mime: &str) -> String {
    format!("{ATTACHMENT_DIR}{id}.{}", extension_for_mime(mime))
}

fn attachment_entry<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str)> {
    preceded(
        ATTACHMENT_DIR,
        separated_pair(
            take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-'),
            '.',
            take_while(1.., |c: char| c.is_ascii_alphanumeric()),
        ),
    )
    .parse_next(input)
}

/// Split `attachments/<id>.<ext>` into `(id, ext)`. The whole (trimmed) name
/// must match; anything else yields `None`.
pub fn parse_entry_name(name: &str) -> Option<(&str, &str)> {
    let mut rest = name.trim();
    let parsed = attachment_entry.parse_next(&mut rest).ok()?;
    rest.is_empty().then_some(parsed)
}
