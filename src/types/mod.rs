//! This module contains the normalized values returned by the mailbox operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A store-assigned message identifier.
///
/// A UID is only meaningful relative to the folder it was obtained in: the same value in two
/// folders names two unrelated messages, and nothing here assumes UIDs are ordered across
/// folders. It is kept as an opaque string on the tool surface; it is only checked to be a
/// non-zero decimal number when it is put on the wire (see [`crate::criteria::uid_set`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageUid(String);

impl MessageUid {
    pub fn new(uid: impl Into<String>) -> Self {
        MessageUid(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u32> for MessageUid {
    fn from(uid: u32) -> Self {
        MessageUid(uid.to_string())
    }
}

impl From<&str> for MessageUid {
    fn from(uid: &str) -> Self {
        MessageUid(uid.to_string())
    }
}

impl fmt::Display for MessageUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

mod appended;
pub use self::appended::AppendOutcome;

mod fetch;
pub use self::fetch::{
    HeaderMap, MessageBody, MessageHeaders, MessageHtml, MessageRecord, MessageSize, MessageText,
};

mod mailbox;
pub use self::mailbox::FolderStatus;

mod name;
pub use self::name::{FolderDescriptor, FolderFlag};
