//! The raw IMAP capability this crate orchestrates.
//!
//! [`MailStore`] is one authenticated connection to the mail store; [`Connector`] produces fresh
//! ones. Everything above this module (session guard, folder scope, facade) only ever talks to
//! these two traits, which is what lets the tests swap in [`crate::testing`] fakes.

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::types::{AppendOutcome, FolderDescriptor, FolderStatus};

/// A failure reported by the raw IMAP capability.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The connection is unusable: I/O error, timeout, or the server hung up.
    #[error("connection failure: {0}")]
    Connection(String),
    /// The named mailbox does not exist.
    #[error("no such mailbox: {0}")]
    NoSuchFolder(String),
    /// The named mailbox exists but the user may not access it.
    #[error("permission denied for mailbox: {0}")]
    PermissionDenied(String),
    /// The server refused the configured credential.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The server rejected a command or answered something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Liveness failures trigger the reconnect path; everything else is surfaced as-is.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

/// Which parts of a message a `UID FETCH` retrieves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchQuery {
    /// UID, size and the header block.
    HeadersOnly,
    /// UID, size and the complete RFC-822 message.
    Full,
}

impl FetchQuery {
    /// The FETCH data items for this query. Never sets `\Seen`.
    pub fn items(self) -> &'static str {
        match self {
            FetchQuery::HeadersOnly => "(UID RFC822.SIZE BODY.PEEK[HEADER])",
            FetchQuery::Full => "(UID RFC822.SIZE BODY.PEEK[])",
        }
    }
}

/// One message as returned by `UID FETCH`, before decoding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub uid: Option<u32>,
    pub size: Option<u32>,
    /// Present for [`FetchQuery::HeadersOnly`].
    pub header: Option<Vec<u8>>,
    /// Present for [`FetchQuery::Full`].
    pub body: Option<Vec<u8>>,
}

/// A single authenticated connection to the mail store.
///
/// Implementations track the selected folder themselves so that [`MailStore::selected`] never
/// needs a round trip.
pub trait MailStore: Send {
    /// Liveness check.
    fn noop(&mut self) -> Result<(), StoreError>;

    /// `LIST reference pattern`. The reference is passed verbatim.
    fn list(&mut self, reference: &str, pattern: &str)
        -> Result<Vec<FolderDescriptor>, StoreError>;

    /// `STATUS folder (MESSAGES RECENT UNSEEN)`. Does not change the selection.
    fn status(&mut self, folder: &str) -> Result<FolderStatus, StoreError>;

    /// The currently selected folder, if any.
    fn selected(&self) -> Option<String>;

    /// `SELECT folder`. On failure nothing is selected afterwards.
    fn select(&mut self, folder: &str) -> Result<(), StoreError>;

    /// Leave the selected state without expunging.
    fn unselect(&mut self) -> Result<(), StoreError>;

    /// `UID SEARCH criteria` against the selected folder.
    fn uid_search(&mut self, criteria: &str) -> Result<Vec<u32>, StoreError>;

    /// `UID FETCH uid_set items` against the selected folder, in the order the store answers.
    fn uid_fetch(&mut self, uid_set: &str, query: FetchQuery)
        -> Result<Vec<RawMessage>, StoreError>;

    /// `APPEND folder (\Draft) [date] {literal}`.
    fn append(
        &mut self,
        folder: &str,
        content: &[u8],
        internal_date: Option<DateTime<FixedOffset>>,
    ) -> Result<AppendOutcome, StoreError>;

    /// `LOGOUT`.
    fn logout(&mut self) -> Result<(), StoreError>;
}

/// Produces freshly authenticated [`MailStore`] connections.
pub trait Connector: Send {
    fn connect(&self) -> Result<Box<dyn MailStore>, StoreError>;
}
