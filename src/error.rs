//! IMAP error types.

use std::result;

use thiserror::Error;

use crate::criteria::CriteriaError;
use crate::store::StoreError;

/// A convenience wrapper around `Result` for `mailbox_tools::Error`.
pub type Result<T> = result::Result<T, Error>;

/// A set of errors that can occur while operating on the mailbox.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The configuration is incomplete: missing host, login or credential.
    /// Only raised at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The session was dead and re-authenticating failed. The next operation retries from
    /// scratch.
    #[error("mail session unavailable: {0}")]
    SessionUnavailable(#[source] StoreError),
    /// The folder does not exist on the store.
    #[error("folder not found: {0}")]
    FolderNotFound(String),
    /// The folder exists but may not be selected or queried.
    #[error("access to folder denied: {0}")]
    FolderAccessDenied(String),
    /// The search criteria (or a UID list) did not follow the search grammar. Nothing was sent
    /// to the store.
    #[error("malformed search criteria: {0}")]
    MalformedCriteria(#[from] CriteriaError),
    /// Any other failure reported by the underlying IMAP capability.
    #[error("mail store error: {0}")]
    MailStore(#[source] StoreError),
}

impl Error {
    /// Whether this error means the connection itself can no longer be trusted.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Error::MailStore(e) => e.is_connection_failure(),
            Error::SessionUnavailable(_) => true,
            _ => false,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Error {
        match err {
            StoreError::NoSuchFolder(folder) => Error::FolderNotFound(folder),
            StoreError::PermissionDenied(folder) => Error::FolderAccessDenied(folder),
            other => Error::MailStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_failures_keep_their_kind() {
        let err: Error = StoreError::NoSuchFolder("Archive".into()).into();
        assert!(matches!(err, Error::FolderNotFound(f) if f == "Archive"));

        let err: Error = StoreError::PermissionDenied("Shared".into()).into();
        assert!(matches!(err, Error::FolderAccessDenied(f) if f == "Shared"));
    }

    #[test]
    fn connection_failures_are_flagged() {
        let err: Error = StoreError::Connection("broken pipe".into()).into();
        assert!(err.is_connection_failure());
        assert!(matches!(err, Error::MailStore(_)));

        let err: Error = StoreError::Protocol("BAD".into()).into();
        assert!(!err.is_connection_failure());
    }
}
