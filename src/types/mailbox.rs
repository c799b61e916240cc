use serde::Serialize;
use std::fmt;

/// Message counts for a folder, as reported by `STATUS`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FolderStatus {
    /// Number of messages in the folder.
    pub messages: u32,
    /// Number of messages with the `\Recent` flag set.
    pub recent: u32,
    /// Number of messages without the `\Seen` flag set.
    pub unseen: u32,
}

impl fmt::Display for FolderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "messages: {}, recent: {}, unseen: {}",
            self.messages, self.recent, self.unseen
        )
    }
}
