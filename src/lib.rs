//! A mailbox for tool-calling agents, over one long-lived IMAP session.
//!
//! # Usage
//!
//! [`MailboxFacade`] is the operation set: list folders, folder status, search, fetch headers,
//! text, HTML or size, and append a draft. Each call makes sure the shared session is alive
//! (reconnecting if needed), visits the folder it needs, and puts the previously selected folder
//! back before returning.
//!
//! ```no_run
//! use mailbox_tools::{Config, MailboxFacade};
//!
//! fn main() -> mailbox_tools::Result<()> {
//!     // IMAP_HOST, IMAP_LOGIN and IMAP_PASSWORD (or IMAP_TOKEN), from the environment or .env
//!     let config = Config::from_env()?;
//!     let mailbox = MailboxFacade::open(&config)?;
//!
//!     for folder in mailbox.list_mailboxes("", "*")? {
//!         println!("{}", folder.path);
//!     }
//!
//!     let unseen = mailbox.search("INBOX", "UNSEEN SINCE 1-Jan-2024")?;
//!     for message in mailbox.fetch_headers("INBOX", &unseen)? {
//!         println!("{}: {:?}", message.uid, message.headers.get("subject"));
//!     }
//!
//!     mailbox.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! Search criteria are checked against [`criteria::GRAMMAR`] before they are sent, so a
//! malformed query fails with [`Error::MalformedCriteria`] instead of reaching the server.
//!
//! The layers underneath are public too: [`SessionGuard`] owns the connection and checks it
//! lazily, [`with_folder`] scopes a folder selection, and [`MailStore`]/[`Connector`] are the raw
//! IMAP capability. With the `test_helpers` feature, the `testing` module implements that
//! capability in memory.

mod parse;
mod types;
mod utils;

pub mod criteria;
pub mod error;
pub mod folder;
pub mod mailbox;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test_helpers"))]
pub mod testing;

pub mod authenticator;
pub mod client;
pub mod config;
#[cfg(feature = "native-tls")]
pub mod client_builder;

pub use crate::authenticator::XOAuth2;
pub use crate::config::{Config, Credential};
pub use crate::criteria::{Criteria, CriteriaError, SearchKey, GRAMMAR};
pub use crate::error::{Error, Result};
pub use crate::folder::{with_folder, FolderScope};
pub use crate::mailbox::MailboxFacade;
pub use crate::parse::{SeqBound, SequenceSet};
pub use crate::session::{Liveness, SecondaryFailure, SessionGuard};
pub use crate::store::{Connector, FetchQuery, MailStore, RawMessage, StoreError};
pub use crate::types::*;

pub use crate::client::ImapStore;

#[cfg(test)]
mod mock_stream;
#[cfg(feature = "native-tls")]
pub use crate::client_builder::ImapConnector;
