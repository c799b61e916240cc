//! Ownership of the single long-lived mail session.

use std::fmt;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::store::{Connector, MailStore, StoreError};

/// What is known about the current connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// No liveness check has run since the connection was (re)established, or there is none yet.
    Unknown,
    /// The last check or operation succeeded.
    Alive,
    /// The connection failed and must be replaced before it is used again.
    Dead,
}

/// A problem that was deliberately not raised, so that it could not mask a primary result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecondaryFailure {
    /// Closing a broken session before reconnecting failed.
    Close(StoreError),
    /// Re-selecting the folder that was selected before a folder scope failed.
    Restore {
        folder: Option<String>,
        error: StoreError,
    },
}

impl fmt::Display for SecondaryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecondaryFailure::Close(e) => write!(f, "closing broken session: {}", e),
            SecondaryFailure::Restore {
                folder: Some(folder),
                error,
            } => write!(f, "restoring folder {}: {}", folder, error),
            SecondaryFailure::Restore {
                folder: None,
                error,
            } => write!(f, "restoring unselected state: {}", error),
        }
    }
}

/// Owns the one shared [`MailStore`] and keeps it usable.
///
/// The connection is checked lazily with [`SessionGuard::ensure_alive`] at the start of every
/// operation; there is no background keep-alive. A failed check replaces the connection in place
/// using the credential captured by the [`Connector`] at startup.
pub struct SessionGuard {
    connector: Box<dyn Connector>,
    store: Option<Box<dyn MailStore>>,
    liveness: Liveness,
    secondary: Vec<SecondaryFailure>,
}

impl SessionGuard {
    /// A guard that connects on first use.
    pub fn new(connector: Box<dyn Connector>) -> Self {
        SessionGuard {
            connector,
            store: None,
            liveness: Liveness::Unknown,
            secondary: Vec::new(),
        }
    }

    /// A guard with an established connection.
    pub fn open(connector: Box<dyn Connector>) -> Result<Self> {
        let mut guard = SessionGuard::new(connector);
        guard.reconnect()?;
        Ok(guard)
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    /// Check the connection with a `NOOP` and replace it if that fails.
    ///
    /// On success the returned store is known to have answered a `NOOP` (or to be freshly
    /// authenticated). If re-authenticating fails the guard is left without a connection, the
    /// error is [`Error::SessionUnavailable`], and the next call starts over.
    pub fn ensure_alive(&mut self) -> Result<&mut dyn MailStore> {
        let answer = match self.store.as_mut() {
            Some(store) if self.liveness != Liveness::Dead => Some(store.noop()),
            _ => None,
        };
        match answer {
            Some(Ok(())) => self.liveness = Liveness::Alive,
            Some(Err(e)) => {
                warn!(error = %e, "liveness check failed, reconnecting");
                self.reconnect()?;
            }
            None => self.reconnect()?,
        }
        self.current()
    }

    /// The current store, without probing.
    pub fn current(&mut self) -> Result<&mut dyn MailStore> {
        match self.store.as_deref_mut() {
            Some(store) => Ok(store),
            None => Err(Error::SessionUnavailable(StoreError::Connection(
                "no session".to_string(),
            ))),
        }
    }

    /// Record that the connection failed mid-operation; the next `ensure_alive` replaces it
    /// without probing.
    pub fn mark_dead(&mut self) {
        if self.liveness != Liveness::Dead {
            warn!("session marked dead");
        }
        self.liveness = Liveness::Dead;
    }

    pub fn record_secondary(&mut self, failure: SecondaryFailure) {
        warn!(%failure, "secondary failure");
        self.secondary.push(failure);
    }

    /// Take the secondary failures recorded so far.
    pub fn secondary_failures(&mut self) -> Vec<SecondaryFailure> {
        std::mem::take(&mut self.secondary)
    }

    fn reconnect(&mut self) -> Result<()> {
        if let Some(mut broken) = self.store.take() {
            if let Err(e) = broken.logout() {
                self.record_secondary(SecondaryFailure::Close(e));
            }
        }
        self.liveness = Liveness::Dead;

        match self.connector.connect() {
            Ok(store) => {
                info!("session established");
                self.store = Some(store);
                self.liveness = Liveness::Unknown;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "could not establish session");
                Err(Error::SessionUnavailable(e))
            }
        }
    }

    /// Log out, ignoring errors.
    pub fn shutdown(&mut self) {
        if let Some(mut store) = self.store.take() {
            if let Err(e) = store.logout() {
                info!(error = %e, "logout failed");
            }
        }
        self.liveness = Liveness::Dead;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}
