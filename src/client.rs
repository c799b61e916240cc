use chrono::{DateTime, FixedOffset};
use imap::types::Flag;
use imap_proto::{NameAttribute, UidSetMember};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{Read, Write};
use tracing::{debug, trace};

use crate::store::{FetchQuery, MailStore, RawMessage, StoreError};
use crate::types::{AppendOutcome, FolderDescriptor, FolderFlag, FolderStatus};

lazy_static! {
    static ref NONEXISTENT: Regex = Regex::new(concat!(
        r"(?i)\[NONEXISTENT\]|does ?n[o']t exist|",
        r"no such (mailbox|folder)|unknown (mailbox|folder)|not found"
    ))
    .unwrap();
    static ref NOPERM: Regex =
        Regex::new(r"(?i)\[NOPERM\]|permission|denied|not allowed|forbidden").unwrap();
}

impl From<imap::Error> for StoreError {
    fn from(err: imap::Error) -> StoreError {
        match err {
            imap::Error::Io(e) => StoreError::Connection(e.to_string()),
            imap::Error::ConnectionLost => StoreError::Connection("connection lost".to_string()),
            other => StoreError::Protocol(other.to_string()),
        }
    }
}

/// Classify a failure of a command that names a folder (SELECT, STATUS, APPEND).
fn folder_error(folder: &str, err: imap::Error) -> StoreError {
    match StoreError::from(err) {
        StoreError::Protocol(message) if NOPERM.is_match(&message) => {
            StoreError::PermissionDenied(folder.to_string())
        }
        StoreError::Protocol(message) if NONEXISTENT.is_match(&message) => {
            StoreError::NoSuchFolder(folder.to_string())
        }
        other => other,
    }
}

fn attribute_flag(attribute: &NameAttribute<'_>) -> FolderFlag {
    match attribute {
        NameAttribute::NoInferiors => FolderFlag::NoInferiors,
        NameAttribute::NoSelect => FolderFlag::NoSelect,
        NameAttribute::Marked => FolderFlag::Marked,
        NameAttribute::Unmarked => FolderFlag::Unmarked,
        NameAttribute::All => FolderFlag::All,
        NameAttribute::Archive => FolderFlag::Archive,
        NameAttribute::Drafts => FolderFlag::Drafts,
        NameAttribute::Flagged => FolderFlag::Flagged,
        NameAttribute::Junk => FolderFlag::Junk,
        NameAttribute::Sent => FolderFlag::Sent,
        NameAttribute::Trash => FolderFlag::Trash,
        NameAttribute::Extension(name) => FolderFlag::from_attribute(name),
        other => FolderFlag::Other(format!("{:?}", other)),
    }
}

fn appended_uids(members: Option<Vec<UidSetMember>>) -> Vec<u32> {
    members
        .unwrap_or_default()
        .into_iter()
        .flat_map(|member| match member {
            UidSetMember::UidRange(range) => range.collect::<Vec<_>>(),
            UidSetMember::Uid(uid) => vec![uid],
        })
        .collect()
}

/// A [`MailStore`] backed by an authenticated [`imap::Session`].
pub struct ImapStore<T: Read + Write> {
    session: imap::Session<T>,
    selected: Option<String>,
    // learned from CAPABILITY on the first unselect
    has_unselect: Option<bool>,
}

impl<T: Read + Write> ImapStore<T> {
    pub fn new(session: imap::Session<T>) -> Self {
        ImapStore {
            session,
            selected: None,
            has_unselect: None,
        }
    }

    fn has_unselect(&mut self) -> Result<bool, StoreError> {
        if let Some(known) = self.has_unselect {
            return Ok(known);
        }
        let known = self.session.capabilities()?.has_str("UNSELECT");
        self.has_unselect = Some(known);
        Ok(known)
    }

    /// Unilateral server data is never consumed here; drop it so the channel does not grow.
    fn drain_unsolicited(&mut self) {
        while let Ok(response) = self.session.unsolicited_responses.try_recv() {
            trace!(?response, "discarding unsolicited response");
        }
    }
}

impl<T: Read + Write + Send> MailStore for ImapStore<T> {
    fn noop(&mut self) -> Result<(), StoreError> {
        self.session.noop()?;
        self.drain_unsolicited();
        Ok(())
    }

    fn list(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<FolderDescriptor>, StoreError> {
        let names = self.session.list(Some(reference), Some(pattern))?;
        let folders = names
            .iter()
            .map(|name| FolderDescriptor {
                path: name.name().to_string(),
                delimiter: name.delimiter().and_then(|d| d.chars().next()),
                flags: name.attributes().iter().map(attribute_flag).collect(),
            })
            .collect();
        self.drain_unsolicited();
        Ok(folders)
    }

    fn status(&mut self, folder: &str) -> Result<FolderStatus, StoreError> {
        let mailbox = self
            .session
            .status(folder, "(MESSAGES RECENT UNSEEN)")
            .map_err(|e| folder_error(folder, e))?;
        self.drain_unsolicited();
        Ok(FolderStatus {
            messages: mailbox.exists,
            recent: mailbox.recent,
            unseen: mailbox.unseen.unwrap_or(0),
        })
    }

    fn selected(&self) -> Option<String> {
        self.selected.clone()
    }

    fn select(&mut self, folder: &str) -> Result<(), StoreError> {
        // a failed SELECT leaves the connection with no folder selected
        match self.session.select(folder) {
            Ok(mailbox) => {
                debug!(folder, exists = mailbox.exists, "selected");
                self.selected = Some(folder.to_string());
                self.drain_unsolicited();
                Ok(())
            }
            Err(e) => {
                self.selected = None;
                Err(folder_error(folder, e))
            }
        }
    }

    fn unselect(&mut self) -> Result<(), StoreError> {
        if self.has_unselect()? {
            self.session.run_command_and_check_ok("UNSELECT")?;
        } else {
            // without RFC 3691, a failed EXAMINE is the way to leave the selected state
            // without expunging
            match self.session.examine("") {
                Err(imap::Error::No(_)) => {}
                Err(e) => return Err(e.into()),
                Ok(_) => self.session.close()?,
            }
        }
        self.selected = None;
        self.drain_unsolicited();
        Ok(())
    }

    fn uid_search(&mut self, criteria: &str) -> Result<Vec<u32>, StoreError> {
        let query = if criteria.is_ascii() {
            criteria.to_string()
        } else {
            format!("CHARSET UTF-8 {}", criteria)
        };
        let mut uids: Vec<u32> = self.session.uid_search(query)?.into_iter().collect();
        uids.sort_unstable();
        self.drain_unsolicited();
        Ok(uids)
    }

    fn uid_fetch(
        &mut self,
        uid_set: &str,
        query: FetchQuery,
    ) -> Result<Vec<RawMessage>, StoreError> {
        let fetches = self.session.uid_fetch(uid_set, query.items())?;
        // FETCH responses without a UID are unilateral flag updates, not answers
        let messages = fetches
            .iter()
            .filter(|fetch| fetch.uid.is_some())
            .map(|fetch| RawMessage {
                uid: fetch.uid,
                size: fetch.size,
                header: fetch.header().map(<[u8]>::to_vec),
                body: fetch.body().map(<[u8]>::to_vec),
            })
            .collect();
        self.drain_unsolicited();
        Ok(messages)
    }

    fn append(
        &mut self,
        folder: &str,
        content: &[u8],
        internal_date: Option<DateTime<FixedOffset>>,
    ) -> Result<AppendOutcome, StoreError> {
        let appended = match internal_date {
            Some(date) => self
                .session
                .append(folder, content)
                .flag(Flag::Draft)
                .internal_date(date)
                .finish(),
            None => self
                .session
                .append(folder, content)
                .flag(Flag::Draft)
                .finish(),
        }
        .map_err(|e| folder_error(folder, e))?;
        self.drain_unsolicited();
        Ok(AppendOutcome {
            folder: folder.to_string(),
            uid_validity: appended.uid_validity,
            uids: appended_uids(appended.uids),
        })
    }

    fn logout(&mut self) -> Result<(), StoreError> {
        self.selected = None;
        self.session.logout()?;
        Ok(())
    }
}
