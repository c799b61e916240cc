//! The operations exposed to a tool-calling agent.

use chrono::{DateTime, FixedOffset};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::criteria::{self, Criteria};
use crate::error::{Error, Result};
use crate::folder::with_folder;
use crate::session::{SecondaryFailure, SessionGuard};
use crate::store::FetchQuery;
use crate::types::{
    AppendOutcome, FolderDescriptor, FolderStatus, MessageHeaders, MessageHtml, MessageRecord,
    MessageSize, MessageText, MessageUid,
};

#[cfg(feature = "native-tls")]
use crate::{client_builder::ImapConnector, config::Config};

/// A mailbox, operated one call at a time over a single shared session.
///
/// Every operation except [`MailboxFacade::who_am_i`] holds the session for its whole duration,
/// including the folder restore, so concurrent callers are serialized and never observe each
/// other's folder selection. Each of those operations first makes sure the session is alive,
/// reconnecting if it is not.
pub struct MailboxFacade {
    identity: String,
    drafts_folder: String,
    session: Mutex<SessionGuard>,
}

impl MailboxFacade {
    pub fn new(
        identity: impl Into<String>,
        drafts_folder: impl Into<String>,
        session: SessionGuard,
    ) -> Self {
        MailboxFacade {
            identity: identity.into(),
            drafts_folder: drafts_folder.into(),
            session: Mutex::new(session),
        }
    }

    /// Validate `config`, authenticate, and wrap the resulting session.
    ///
    /// A missing host, login or credential fails with [`Error::Configuration`]; a server that
    /// refuses the connection or the credential fails with [`Error::SessionUnavailable`].
    #[cfg(feature = "native-tls")]
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let connector = ImapConnector::from_config(config)?;
        let session = SessionGuard::open(Box::new(connector))?;
        Ok(MailboxFacade::new(
            config.login()?,
            config.drafts_folder.as_str(),
            session,
        ))
    }

    fn lock(&self) -> MutexGuard<'_, SessionGuard> {
        // a panic inside an operation leaves at worst a dead connection, which the next
        // liveness check replaces
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run<T, F>(&self, operation: &'static str, body: F) -> Result<T>
    where
        F: FnOnce(&mut SessionGuard) -> Result<T>,
    {
        let mut session = self.lock();
        session.ensure_alive()?;
        let result = body(&mut *session);
        match &result {
            Ok(_) => debug!(operation, "done"),
            Err(e) => {
                debug!(operation, error = %e, "failed");
                if e.is_connection_failure() {
                    session.mark_dead();
                }
            }
        }
        result
    }

    /// The configured address of the mailbox. Use it to confirm which mailbox the other
    /// operations act on. Does no I/O.
    pub fn who_am_i(&self) -> &str {
        &self.identity
    }

    /// The folder drafts are appended to.
    pub fn drafts_folder(&self) -> &str {
        &self.drafts_folder
    }

    /// Enumerate the folders under `base` whose names match `pattern`.
    ///
    /// `base` is the folder to look under, e.g. `INBOX`, or `INBOX/Trash` on a server whose
    /// hierarchy delimiter is `/`. An empty `base` searches from the root.
    ///
    /// In `pattern`, `*` matches zero or more characters including the hierarchy delimiter (so
    /// it reaches every descendant) and `%` matches zero or more characters but not the
    /// delimiter (so it stays at one level).
    ///
    /// # Examples
    ///
    /// - every folder: `list_mailboxes("", "*")`
    /// - everything below `Archives`: `list_mailboxes("Archives", "*")`
    /// - children of `INBOX` starting with `Q`, one level deep: `list_mailboxes("INBOX", "Q%")`
    ///
    /// Paths in the result are absolute from the root, so they can be passed straight to the
    /// other operations. The selected folder is left alone.
    pub fn list_mailboxes(&self, base: &str, pattern: &str) -> Result<Vec<FolderDescriptor>> {
        self.run("list", |session| {
            let store = session.current()?;
            let reference = if base.is_empty() {
                String::new()
            } else {
                // `LIST "" ""` answers with the hierarchy delimiter only
                let delimiter = store
                    .list("", "")?
                    .into_iter()
                    .find_map(|root| root.delimiter);
                match delimiter {
                    Some(d) if !base.ends_with(d) => format!("{}{}", base, d),
                    _ => base.to_string(),
                }
            };
            Ok(store.list(&reference, pattern)?)
        })
    }

    /// Message counts for `folder`: total, recent and unseen. The selected folder is left alone.
    pub fn mailbox_status(&self, folder: &str) -> Result<FolderStatus> {
        self.run("status", |session| Ok(session.current()?.status(folder)?))
    }

    /// UIDs of the messages in `folder` (not its subfolders) that match `criteria`, in
    /// ascending order.
    ///
    /// `criteria` uses IMAP SEARCH syntax in prefix notation; see [`criteria::GRAMMAR`] for the
    /// full reference. A malformed string fails with [`Error::MalformedCriteria`] before anything
    /// is sent to the server.
    ///
    /// # Examples
    ///
    /// - `UNSEEN SINCE 1-Jan-2024`
    /// - `OR FROM alice@example.com FROM bob@example.com`
    /// - `NOT (SEEN FLAGGED)`
    ///
    /// The UIDs are only meaningful in `folder`.
    pub fn search(&self, folder: &str, criteria: &str) -> Result<Vec<MessageUid>> {
        let criteria = Criteria::parse(criteria)?;
        self.run("search", |session| {
            with_folder(session, folder, |store| {
                let uids = store.uid_search(criteria.as_str())?;
                Ok(uids.into_iter().map(MessageUid::from).collect())
            })
        })
    }

    /// Fetch the messages `uids` of `folder` in one request, without marking them seen.
    ///
    /// With `headers_only` only the header block is retrieved and the records carry no body.
    /// Records come back in the order the server sends them, which need not be the order of
    /// `uids`; UIDs that no longer exist are simply missing from the result.
    pub fn fetch_messages(
        &self,
        folder: &str,
        uids: &[MessageUid],
        headers_only: bool,
    ) -> Result<Vec<MessageRecord>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let uid_set = criteria::uid_set(uids)?;
        let query = if headers_only {
            FetchQuery::HeadersOnly
        } else {
            FetchQuery::Full
        };

        self.run("fetch", |session| {
            with_folder(session, folder, |store| {
                store
                    .uid_fetch(&uid_set, query)?
                    .iter()
                    .map(|raw| MessageRecord::decode(raw).map_err(Error::from))
                    .collect()
            })
        })
    }

    /// The headers of each message in `uids`. Repeated headers keep every value, in order.
    pub fn fetch_headers(&self, folder: &str, uids: &[MessageUid]) -> Result<Vec<MessageHeaders>> {
        Ok(project(self.fetch_messages(folder, uids, true)?))
    }

    /// The plain-text body of each message in `uids`: every `text/plain` part that is not an
    /// attachment, joined.
    pub fn fetch_text(&self, folder: &str, uids: &[MessageUid]) -> Result<Vec<MessageText>> {
        Ok(project(self.fetch_messages(folder, uids, false)?))
    }

    /// The HTML body of each message in `uids`: every `text/html` part that is not an
    /// attachment, joined.
    pub fn fetch_html(&self, folder: &str, uids: &[MessageUid]) -> Result<Vec<MessageHtml>> {
        Ok(project(self.fetch_messages(folder, uids, false)?))
    }

    /// The size in bytes of each message in `uids`. Only headers are transferred.
    pub fn fetch_size(&self, folder: &str, uids: &[MessageUid]) -> Result<Vec<MessageSize>> {
        Ok(project(self.fetch_messages(folder, uids, true)?))
    }

    /// Append `content`, a complete RFC 822 message, to the drafts folder with the `\Draft`
    /// flag.
    ///
    /// `content` is stored as is: it must already carry every header the draft needs,
    /// including `In-Reply-To` and `References` naming the original `Message-ID` when it is a
    /// reply. `timestamp` becomes the internal date of the draft; without it the server uses
    /// the time of the append.
    ///
    /// The append is not retried if the connection drops while it is in flight.
    pub fn create_draft_message(
        &self,
        content: &[u8],
        timestamp: Option<DateTime<FixedOffset>>,
    ) -> Result<AppendOutcome> {
        self.run("append", |session| {
            Ok(session
                .current()?
                .append(&self.drafts_folder, content, timestamp)?)
        })
    }

    /// Problems that were logged instead of raised since the last call: failed folder restores
    /// and failed closes of broken connections.
    pub fn secondary_failures(&self) -> Vec<SecondaryFailure> {
        self.lock().secondary_failures()
    }

    /// Log out, ignoring errors. A later operation reconnects.
    pub fn shutdown(&self) {
        self.lock().shutdown();
    }
}

fn project<T: From<MessageRecord>>(records: Vec<MessageRecord>) -> Vec<T> {
    records.into_iter().map(T::from).collect()
}
