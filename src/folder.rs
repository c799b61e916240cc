//! Visiting a folder without disturbing the session's selection.
//!
//! [`with_folder`] selects a folder for the duration of one operation and then puts back
//! whatever was selected before, including nothing at all.

use tracing::debug;

use crate::error::{Error, Result};
use crate::session::{SecondaryFailure, SessionGuard};
use crate::store::{MailStore, StoreError};

/// The selection state to come back to after visiting a folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderScope {
    previous: Option<String>,
    target: String,
}

impl FolderScope {
    /// Remember what `store` has selected now, before moving to `target`.
    pub fn new(store: &dyn MailStore, target: &str) -> Self {
        FolderScope {
            previous: store.selected(),
            target: target.to_string(),
        }
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn enter(&self, store: &mut dyn MailStore) -> std::result::Result<(), StoreError> {
        debug!(folder = %self.target, previous = ?self.previous, "entering folder");
        store.select(&self.target)
    }

    /// Put the previous selection back. Does nothing if it is already in place.
    pub fn restore(&self, store: &mut dyn MailStore) -> std::result::Result<(), StoreError> {
        if store.selected() == self.previous {
            return Ok(());
        }
        match &self.previous {
            Some(folder) => store.select(folder),
            None => store.unselect(),
        }
    }
}

/// Run `body` with `folder` selected, and restore the previous selection on every exit path.
///
/// A folder that cannot be selected fails with [`Error::FolderNotFound`] or
/// [`Error::FolderAccessDenied`] without running `body`. A failed restore never replaces the
/// outcome of `body`: it is recorded as a [`SecondaryFailure`] on the session, and if it was a
/// connection failure the session is marked dead.
pub fn with_folder<T, F>(session: &mut SessionGuard, folder: &str, body: F) -> Result<T>
where
    F: FnOnce(&mut dyn MailStore) -> Result<T>,
{
    let store = session.current()?;
    let scope = FolderScope::new(&*store, folder);

    let outcome = match scope.enter(store) {
        Ok(()) => body(&mut *store),
        Err(e) => Err(Error::from(e)),
    };

    if let Err(error) = scope.restore(store) {
        if error.is_connection_failure() {
            session.mark_dead();
        }
        session.record_secondary(SecondaryFailure::Restore {
            folder: scope.previous().map(str::to_string),
            error,
        });
    }
    outcome
}
