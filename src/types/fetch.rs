use mailparse::{DispositionType, MailHeader, ParsedMail};
use serde::Serialize;
use std::collections::BTreeMap;

use super::MessageUid;
use crate::store::{RawMessage, StoreError};

/// Header name (lowercased) to every value it was given, in message order, since a header may
/// repeat (`Received`, `Comments`, ...).
pub type HeaderMap = BTreeMap<String, Vec<String>>;

/// Whether the body of a [`MessageRecord`] was fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    /// Only the header block was requested.
    HeadersOnly,
    /// The full message was requested and decoded.
    Full {
        /// All `text/plain` parts that are not attachments, joined.
        text: String,
        /// All `text/html` parts that are not attachments, joined.
        html: String,
    },
}

/// A message fetched from a folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub uid: MessageUid,
    /// `RFC822.SIZE`, in bytes.
    pub size: Option<u64>,
    pub headers: HeaderMap,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl MessageRecord {
    pub fn headers_only(&self) -> bool {
        matches!(self.body, MessageBody::HeadersOnly)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Full { text, .. } => Some(text),
            MessageBody::HeadersOnly => None,
        }
    }

    pub fn html(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Full { html, .. } => Some(html),
            MessageBody::HeadersOnly => None,
        }
    }

    /// Decode one `UID FETCH` answer.
    pub(crate) fn decode(raw: &RawMessage) -> Result<MessageRecord, StoreError> {
        let uid = raw
            .uid
            .map(MessageUid::from)
            .ok_or_else(|| StoreError::Protocol("FETCH response without UID".into()))?;
        let size = raw.size.map(u64::from);

        if let Some(body) = raw.body.as_deref() {
            let parsed = mailparse::parse_mail(body).map_err(|e| {
                StoreError::Protocol(format!("undecodable message {}: {}", uid, e))
            })?;
            let mut text = String::new();
            let mut html = String::new();
            collect_parts(&parsed, &mut text, &mut html).map_err(|e| {
                StoreError::Protocol(format!("undecodable body {}: {}", uid, e))
            })?;
            return Ok(MessageRecord {
                uid,
                size,
                headers: header_map(&parsed.headers),
                body: MessageBody::Full { text, html },
            });
        }

        let header = raw.header.as_deref().unwrap_or_default();
        let (headers, _) = mailparse::parse_headers(header).map_err(|e| {
            StoreError::Protocol(format!("undecodable header {}: {}", uid, e))
        })?;
        Ok(MessageRecord {
            uid,
            size,
            headers: header_map(&headers),
            body: MessageBody::HeadersOnly,
        })
    }
}

fn header_map(headers: &[MailHeader<'_>]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for header in headers {
        map.entry(header.get_key().to_ascii_lowercase())
            .or_insert_with(Vec::new)
            .push(header.get_value());
    }
    map
}

fn collect_parts(
    part: &ParsedMail<'_>,
    text: &mut String,
    html: &mut String,
) -> Result<(), mailparse::MailParseError> {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, text, html)?;
        }
        return Ok(());
    }
    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return Ok(());
    }
    let target = match part.ctype.mimetype.as_str() {
        "text/plain" => text,
        "text/html" => html,
        _ => return Ok(()),
    };
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(&part.get_body()?);
    Ok(())
}

/// The header projection of a fetched message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageHeaders {
    pub uid: MessageUid,
    pub headers: HeaderMap,
}

/// The plain-text projection of a fetched message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageText {
    pub uid: MessageUid,
    pub text: String,
}

/// The HTML projection of a fetched message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageHtml {
    pub uid: MessageUid,
    pub html: String,
}

/// The size projection of a fetched message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageSize {
    pub uid: MessageUid,
    pub size: Option<u64>,
}

impl From<MessageRecord> for MessageHeaders {
    fn from(record: MessageRecord) -> Self {
        MessageHeaders {
            uid: record.uid,
            headers: record.headers,
        }
    }
}

impl From<MessageRecord> for MessageText {
    fn from(record: MessageRecord) -> Self {
        let text = match record.body {
            MessageBody::Full { text, .. } => text,
            MessageBody::HeadersOnly => String::new(),
        };
        MessageText {
            uid: record.uid,
            text,
        }
    }
}

impl From<MessageRecord> for MessageHtml {
    fn from(record: MessageRecord) -> Self {
        let html = match record.body {
            MessageBody::Full { html, .. } => html,
            MessageBody::HeadersOnly => String::new(),
        };
        MessageHtml {
            uid: record.uid,
            html,
        }
    }
}

impl From<MessageRecord> for MessageSize {
    fn from(record: MessageRecord) -> Self {
        MessageSize {
            uid: record.uid,
            size: record.size,
        }
    }
}
