use serde::Serialize;
use std::fmt;

/// The outcome of appending a message, as returned by
/// [`APPEND`](https://tools.ietf.org/html/rfc3501#section-6.3.11).
/// Note that `APPEND` only returns any data if certain extensions are enabled,
/// for example [`UIDPLUS`](https://tools.ietf.org/html/rfc4315).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AppendOutcome {
    /// The folder the message was appended to.
    pub folder: String,
    /// The unique identifier validity value of the folder. Only present if the server supports
    /// `UIDPLUS`.
    pub uid_validity: Option<u32>,
    /// The UIDs assigned to the appended message. Empty unless the server supports `UIDPLUS`.
    pub uids: Vec<u32>,
}

impl fmt::Display for AppendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "folder: {}, uid_validity: {:?}, uids: {:?}",
            self.folder, self.uid_validity, self.uids,
        )
    }
}
