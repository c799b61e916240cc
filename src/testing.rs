//! An in-memory mail store, for testing code built on this crate without a server.
//!
//! [`FakeServer`] holds folders and messages; [`FakeServer::connector`] hands out
//! [`FakeStore`] connections to it that implement [`MailStore`]. Searches are evaluated for
//! real against the fixture messages, with the same AND/OR/NOT reading of the grammar that
//! [`crate::criteria::parse`] produces, so query properties can be checked end to end.
//!
//! The server also counts calls per [`Op`], can drop every open connection, refuse connects,
//! and fail the next call of a given kind.
//!
//! The module is compiled with the `test_helpers` feature; add it to the dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! mailbox-tools = { version = "0.1", features = ["test_helpers"] }
//! ```
//!
//! ```
//! use mailbox_tools::testing::{FakeMessage, FakeServer, Op};
//! use mailbox_tools::{MailboxFacade, SessionGuard};
//!
//! let server = FakeServer::new()
//!     .folder("INBOX")
//!     .message("INBOX", FakeMessage::new("alice@example.com", "hi", "hello").flag("\\Seen"));
//! let session = SessionGuard::open(Box::new(server.connector())).unwrap();
//! let mailbox = MailboxFacade::new("me@example.com", "Drafts", session);
//!
//! assert_eq!(mailbox.search("INBOX", "SEEN").unwrap().len(), 1);
//! assert_eq!(server.calls(Op::Search), 1);
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::criteria::{self, SearchKey};
use crate::parse;
use crate::store::{Connector, FetchQuery, MailStore, RawMessage, StoreError};
use crate::types::{AppendOutcome, FolderDescriptor, FolderFlag, FolderStatus};
use crate::utils::list_pattern;

/// The kinds of call the fake counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    Noop,
    List,
    Status,
    Select,
    Unselect,
    Search,
    Fetch,
    Append,
    Logout,
}

/// A fixture message.
#[derive(Clone, Debug)]
pub struct FakeMessage {
    raw: Vec<u8>,
    flags: BTreeSet<String>,
    internal_date: NaiveDate,
}

impl FakeMessage {
    /// A plain-text message with the given sender, subject and body.
    pub fn new(from: &str, subject: &str, text: &str) -> Self {
        FakeMessage::raw(format!(
            "From: {}\r\nTo: me@example.com\r\nSubject: {}\r\nDate: Mon, 1 Jan 2024 10:00:00 +0000\r\n\
             Message-ID: <{}@example.com>\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
            from,
            subject,
            subject.to_ascii_lowercase().replace(' ', "."),
            text
        ))
    }

    /// A message from complete RFC 822 bytes.
    pub fn raw(raw: impl Into<Vec<u8>>) -> Self {
        FakeMessage {
            raw: raw.into(),
            flags: BTreeSet::new(),
            internal_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
        }
    }

    /// Add a system flag (`\Seen`) or keyword. Flags compare case-insensitively.
    pub fn flag(mut self, flag: &str) -> Self {
        self.flags.insert(flag.to_ascii_lowercase());
        self
    }

    /// Set the internal (delivery) date.
    pub fn received(mut self, date: NaiveDate) -> Self {
        self.internal_date = date;
        self
    }

    fn has(&self, flag: &str) -> bool {
        self.flags.contains(&flag.to_ascii_lowercase())
    }

    fn header_block(&self) -> &[u8] {
        let end = find(&self.raw, b"\r\n\r\n")
            .map(|i| i + 4)
            .or_else(|| find(&self.raw, b"\n\n").map(|i| i + 2))
            .unwrap_or(self.raw.len());
        &self.raw[..end]
    }

    fn headers(&self) -> Vec<(String, String)> {
        mailparse::parse_headers(self.header_block())
            .map(|(headers, _)| {
                headers
                    .iter()
                    .map(|h| (h.get_key().to_ascii_lowercase(), h.get_value()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn body_text(&self) -> String {
        let body = &self.raw[self.header_block().len()..];
        match mailparse::parse_mail(&self.raw) {
            Ok(parsed) => {
                let mut out = String::new();
                collect_text(&parsed, &mut out);
                out
            }
            Err(_) => String::from_utf8_lossy(body).into_owned(),
        }
    }

    fn sent_date(&self) -> Option<NaiveDate> {
        let (_, date) = self.headers().into_iter().find(|(k, _)| k == "date")?;
        let timestamp = mailparse::dateparse(&date).ok()?;
        DateTime::from_timestamp(timestamp, 0).map(|d| d.date_naive())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn collect_text(part: &mailparse::ParsedMail<'_>, out: &mut String) {
    if part.subparts.is_empty() {
        if let Ok(body) = part.get_body() {
            out.push_str(&body);
            out.push('\n');
        }
    }
    for sub in &part.subparts {
        collect_text(sub, out);
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

struct StoredMessage {
    uid: u32,
    message: FakeMessage,
}

struct FakeFolder {
    flags: BTreeSet<FolderFlag>,
    uid_validity: u32,
    next_uid: u32,
    messages: Vec<StoredMessage>,
}

struct State {
    delimiter: char,
    folders: BTreeMap<String, FakeFolder>,
    denied: BTreeSet<String>,
    calls: HashMap<Op, usize>,
    generation: u64,
    refused_connects: usize,
    failures: HashMap<Op, VecDeque<StoreError>>,
    selected: Option<String>,
}

impl State {
    /// Count a call, then hand back any failure scheduled for it.
    fn enter(&mut self, op: Op) -> Result<(), StoreError> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn folder(&self, name: &str) -> Result<&FakeFolder, StoreError> {
        if self.denied.contains(name) {
            return Err(StoreError::PermissionDenied(name.to_string()));
        }
        self.folders
            .get(name)
            .ok_or_else(|| StoreError::NoSuchFolder(name.to_string()))
    }

    fn descriptor(&self, name: &str, folder: &FakeFolder) -> FolderDescriptor {
        let prefix = format!("{}{}", name, self.delimiter);
        let children = self.folders.keys().any(|other| other.starts_with(&prefix));
        let shape = if children {
            FolderFlag::HasChildren
        } else {
            FolderFlag::HasNoChildren
        };
        let mut descriptor = FolderDescriptor::new(name, Some(self.delimiter)).with_flag(shape);
        descriptor.flags.extend(folder.flags.iter().cloned());
        descriptor
    }
}

/// An in-memory mail store shared by every connection made to it.
#[derive(Clone)]
pub struct FakeServer(Arc<Mutex<State>>);

impl Default for FakeServer {
    fn default() -> Self {
        FakeServer::new()
    }
}

impl FakeServer {
    /// An empty server with `/` as the hierarchy delimiter.
    pub fn new() -> Self {
        FakeServer(Arc::new(Mutex::new(State {
            delimiter: '/',
            folders: BTreeMap::new(),
            denied: BTreeSet::new(),
            calls: HashMap::new(),
            generation: 0,
            refused_connects: 0,
            failures: HashMap::new(),
            selected: None,
        })))
    }

    /// `INBOX` with five messages, `INBOX/Trash`, `Sent` with one message, and an empty
    /// `Drafts`.
    ///
    /// | UID | from              | subject          | flags                    | received    |
    /// |-----|-------------------|------------------|--------------------------|-------------|
    /// | 1   | alice@example.com | Quarterly report | Seen                     | 10-Jan-2024 |
    /// | 2   | bob@example.com   | Lunch            | Seen Flagged             | 1-Feb-2024  |
    /// | 3   | carol@example.com | Invoice          | Seen Flagged, multipart  | 15-Feb-2024 |
    /// | 4   | alice@example.com | Re: Lunch        | Recent                   | 1-Mar-2024  |
    /// | 5   | bob@example.com   | Build failed     | Flagged Answered, html   | 5-Mar-2024  |
    pub fn standard() -> Self {
        let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap_or_default();
        FakeServer::new()
            .folder("INBOX")
            .folder("INBOX/Trash")
            .special_folder("Sent", FolderFlag::Sent)
            .special_folder("Drafts", FolderFlag::Drafts)
            .message(
                "INBOX",
                FakeMessage::new("alice@example.com", "Quarterly report", "Numbers attached.")
                    .flag("\\Seen")
                    .received(day(1, 10)),
            )
            .message(
                "INBOX",
                FakeMessage::new("bob@example.com", "Lunch", "Noon at the usual place?")
                    .flag("\\Seen")
                    .flag("\\Flagged")
                    .received(day(2, 1)),
            )
            .message(
                "INBOX",
                invoice()
                    .flag("\\Seen")
                    .flag("\\Flagged")
                    .received(day(2, 15)),
            )
            .message(
                "INBOX",
                FakeMessage::new("alice@example.com", "Re: Lunch", "Sounds good.")
                    .flag("\\Recent")
                    .received(day(3, 1)),
            )
            .message(
                "INBOX",
                build_report()
                    .flag("\\Flagged")
                    .flag("\\Answered")
                    .received(day(3, 5)),
            )
            .message(
                "Sent",
                FakeMessage::new("me@example.com", "Re: Quarterly report", "Thanks!")
                    .flag("\\Seen"),
            )
    }

    pub fn delimiter(self, delimiter: char) -> Self {
        self.state().delimiter = delimiter;
        self
    }

    pub fn folder(self, name: &str) -> Self {
        self.state().folders.entry(name.to_string()).or_insert_with(|| FakeFolder {
            flags: BTreeSet::new(),
            uid_validity: 1,
            next_uid: 1,
            messages: Vec::new(),
        });
        self
    }

    /// A folder carrying a special-use attribute such as `\Sent`.
    pub fn special_folder(self, name: &str, flag: FolderFlag) -> Self {
        let server = self.folder(name);
        if let Some(folder) = server.state().folders.get_mut(name) {
            folder.flags.insert(flag);
        }
        server
    }

    /// Add a message to `folder` (which must have been created), with the next UID.
    pub fn message(self, folder: &str, message: FakeMessage) -> Self {
        if let Some(folder) = self.state().folders.get_mut(folder) {
            let uid = folder.next_uid;
            folder.next_uid += 1;
            folder.messages.push(StoredMessage { uid, message });
        }
        self
    }

    /// Make `folder` inaccessible to SELECT, STATUS and APPEND.
    pub fn deny(self, folder: &str) -> Self {
        self.state().denied.insert(folder.to_string());
        self
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            server: self.clone(),
            initial_folder: "INBOX".to_string(),
        }
    }

    /// How many times `op` was called, including calls that failed.
    pub fn calls(&self, op: Op) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// The folder selected on the most recently used connection.
    pub fn selected(&self) -> Option<String> {
        self.state().selected.clone()
    }

    /// Break every open connection: their next call fails with a connection error.
    pub fn drop_connections(&self) {
        self.state().generation += 1;
    }

    /// Refuse the next `n` connects with an authentication failure.
    pub fn refuse_connects(&self, n: usize) {
        self.state().refused_connects = n;
    }

    /// Fail the next call of kind `op` with `error`. Failures for the same kind queue up.
    pub fn fail_next(&self, op: Op, error: StoreError) {
        self.state()
            .failures
            .entry(op)
            .or_insert_with(VecDeque::new)
            .push_back(error);
    }

    /// UIDs currently in `folder`, ascending.
    pub fn uids(&self, folder: &str) -> Vec<u32> {
        self.state()
            .folders
            .get(folder)
            .map(|f| f.messages.iter().map(|m| m.uid).collect())
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn invoice() -> FakeMessage {
    FakeMessage::raw(
        "From: carol@example.com\r\nTo: me@example.com\r\nSubject: Invoice\r\n\
         Date: Thu, 15 Feb 2024 09:30:00 +0100\r\nMessage-ID: <invoice@example.com>\r\n\
         MIME-Version: 1.0\r\nContent-Type: multipart/mixed; boundary=\"outer\"\r\n\r\n\
         --outer\r\nContent-Type: multipart/alternative; boundary=\"inner\"\r\n\r\n\
         --inner\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nPlease find the invoice attached.\r\n\
         --inner\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<p>Please find the invoice attached.</p>\r\n\
         --inner--\r\n\
         --outer\r\nContent-Type: text/plain; name=\"invoice.txt\"\r\n\
         Content-Disposition: attachment; filename=\"invoice.txt\"\r\n\r\nTOTAL 42.00\r\n\
         --outer--\r\n",
    )
}

fn build_report() -> FakeMessage {
    FakeMessage::raw(
        "From: bob@example.com\r\nTo: me@example.com\r\nSubject: Build failed\r\n\
         Date: Tue, 5 Mar 2024 18:00:00 +0000\r\nMessage-ID: <build@example.com>\r\n\
         MIME-Version: 1.0\r\nContent-Type: text/html; charset=utf-8\r\n\r\n\
         <html><body><b>main</b> is red</body></html>\r\n",
    )
}

/// Hands out [`FakeStore`] connections to a [`FakeServer`].
pub struct FakeConnector {
    server: FakeServer,
    initial_folder: String,
}

impl FakeConnector {
    /// Folder selected on each new connection, `INBOX` by default. It is skipped if missing.
    pub fn initial_folder(mut self, folder: &str) -> Self {
        self.initial_folder = folder.to_string();
        self
    }
}

impl Connector for FakeConnector {
    fn connect(&self) -> Result<Box<dyn MailStore>, StoreError> {
        let mut state = self.server.state();
        *state.calls.entry(Op::Connect).or_insert(0) += 1;
        if state.refused_connects > 0 {
            state.refused_connects -= 1;
            return Err(StoreError::Authentication("invalid credentials".into()));
        }
        let injected = state
            .failures
            .get_mut(&Op::Connect)
            .and_then(VecDeque::pop_front);
        if let Some(e) = injected {
            return Err(e);
        }

        let selected = state
            .folders
            .contains_key(&self.initial_folder)
            .then(|| self.initial_folder.clone());
        state.selected = selected.clone();
        Ok(Box::new(FakeStore {
            server: self.server.clone(),
            generation: state.generation,
            selected,
        }))
    }
}

/// One connection to a [`FakeServer`].
pub struct FakeStore {
    server: FakeServer,
    generation: u64,
    selected: Option<String>,
}

impl FakeStore {
    /// Count the call and check the connection is still up.
    fn enter(&self, op: Op) -> Result<MutexGuard<'_, State>, StoreError> {
        let mut state = self.server.state();
        state.enter(op)?;
        if state.generation != self.generation {
            return Err(StoreError::Connection("connection reset by peer".into()));
        }
        Ok(state)
    }

    fn selected_folder<'a>(&self, state: &'a State) -> Result<&'a FakeFolder, StoreError> {
        let name = self
            .selected
            .as_deref()
            .ok_or_else(|| StoreError::Protocol("BAD no mailbox selected".into()))?;
        state.folder(name)
    }
}

impl MailStore for FakeStore {
    fn noop(&mut self) -> Result<(), StoreError> {
        self.enter(Op::Noop).map(|_| ())
    }

    fn list(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<FolderDescriptor>, StoreError> {
        let state = self.enter(Op::List)?;
        if reference.is_empty() && pattern.is_empty() {
            return Ok(vec![
                FolderDescriptor::new("", Some(state.delimiter)).with_flag(FolderFlag::NoSelect)
            ]);
        }
        let full = format!("{}{}", reference, pattern);
        let matcher = list_pattern(&full, Some(state.delimiter))
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        Ok(state
            .folders
            .iter()
            .filter(|(name, _)| matcher.is_match(name))
            .map(|(name, folder)| state.descriptor(name, folder))
            .collect())
    }

    fn status(&mut self, folder: &str) -> Result<FolderStatus, StoreError> {
        let state = self.enter(Op::Status)?;
        let folder = state.folder(folder)?;
        let count = |flag: &str, present: bool| {
            folder
                .messages
                .iter()
                .filter(|m| m.message.has(flag) == present)
                .count() as u32
        };
        Ok(FolderStatus {
            messages: folder.messages.len() as u32,
            recent: count("\\Recent", true),
            unseen: count("\\Seen", false),
        })
    }

    fn selected(&self) -> Option<String> {
        self.selected.clone()
    }

    fn select(&mut self, folder: &str) -> Result<(), StoreError> {
        // give another thread the chance to interleave, were the caller not serialized
        std::thread::yield_now();
        self.selected = None;
        let mut state = self.enter(Op::Select)?;
        state.selected = None;
        state.folder(folder)?;
        state.selected = Some(folder.to_string());
        drop(state);
        self.selected = Some(folder.to_string());
        Ok(())
    }

    fn unselect(&mut self) -> Result<(), StoreError> {
        let mut state = self.enter(Op::Unselect)?;
        state.selected = None;
        drop(state);
        self.selected = None;
        Ok(())
    }

    fn uid_search(&mut self, criteria: &str) -> Result<Vec<u32>, StoreError> {
        let state = self.enter(Op::Search)?;
        let key = criteria::parse(criteria)
            .map_err(|e| StoreError::Protocol(format!("BAD {}", e)))?;
        let folder = self.selected_folder(&state)?;
        let largest_uid = folder.messages.last().map_or(0, |m| m.uid);
        let count = folder.messages.len() as u32;
        Ok(folder
            .messages
            .iter()
            .enumerate()
            .filter(|(i, m)| {
                let ctx = Context {
                    uid: m.uid,
                    seq: *i as u32 + 1,
                    largest_uid,
                    count,
                };
                evaluate(&key, &m.message, &ctx)
            })
            .map(|(_, m)| m.uid)
            .collect())
    }

    fn uid_fetch(
        &mut self,
        uid_set: &str,
        query: FetchQuery,
    ) -> Result<Vec<RawMessage>, StoreError> {
        let state = self.enter(Op::Fetch)?;
        let set = parse::sequence_set(uid_set).ok_or_else(|| {
            StoreError::Protocol(format!("BAD invalid UID set {}", uid_set))
        })?;
        let folder = self.selected_folder(&state)?;
        let largest_uid = folder.messages.last().map_or(0, |m| m.uid);
        Ok(folder
            .messages
            .iter()
            .filter(|m| set.contains(m.uid, largest_uid))
            .map(|m| {
                let mut raw = RawMessage {
                    uid: Some(m.uid),
                    size: Some(m.message.raw.len() as u32),
                    ..RawMessage::default()
                };
                match query {
                    FetchQuery::HeadersOnly => raw.header = Some(m.message.header_block().to_vec()),
                    FetchQuery::Full => raw.body = Some(m.message.raw.clone()),
                }
                raw
            })
            .collect())
    }

    fn append(
        &mut self,
        folder: &str,
        content: &[u8],
        internal_date: Option<DateTime<FixedOffset>>,
    ) -> Result<AppendOutcome, StoreError> {
        let mut state = self.enter(Op::Append)?;
        state.folder(folder)?;
        let target = state
            .folders
            .get_mut(folder)
            .ok_or_else(|| StoreError::NoSuchFolder(folder.to_string()))?;

        let uid = target.next_uid;
        target.next_uid += 1;
        let date = internal_date.map_or_else(|| Utc::now().date_naive(), |d| d.date_naive());
        target.messages.push(StoredMessage {
            uid,
            message: FakeMessage::raw(content).flag("\\Draft").received(date),
        });
        Ok(AppendOutcome {
            folder: folder.to_string(),
            uid_validity: Some(target.uid_validity),
            uids: vec![uid],
        })
    }

    fn logout(&mut self) -> Result<(), StoreError> {
        self.selected = None;
        self.enter(Op::Logout).map(|_| ())
    }
}

struct Context {
    uid: u32,
    seq: u32,
    largest_uid: u32,
    count: u32,
}

fn header_contains(message: &FakeMessage, name: &str, needle: &str) -> bool {
    message
        .headers()
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case(name) && contains(v, needle))
}

fn evaluate(key: &SearchKey, m: &FakeMessage, ctx: &Context) -> bool {
    use SearchKey::*;
    match key {
        And(keys) => keys.iter().all(|k| evaluate(k, m, ctx)),
        Or(a, b) => evaluate(a, m, ctx) || evaluate(b, m, ctx),
        Not(k) => !evaluate(k, m, ctx),

        All => true,
        Answered => m.has("\\Answered"),
        Deleted => m.has("\\Deleted"),
        Draft => m.has("\\Draft"),
        Flagged => m.has("\\Flagged"),
        New => m.has("\\Recent") && !m.has("\\Seen"),
        Old => !m.has("\\Recent"),
        Recent => m.has("\\Recent"),
        Seen => m.has("\\Seen"),
        Unanswered => !m.has("\\Answered"),
        Undeleted => !m.has("\\Deleted"),
        Undraft => !m.has("\\Draft"),
        Unflagged => !m.has("\\Flagged"),
        Unseen => !m.has("\\Seen"),
        Keyword(k) => m.has(k),
        Unkeyword(k) => !m.has(k),

        Bcc(s) => header_contains(m, "bcc", s),
        Cc(s) => header_contains(m, "cc", s),
        From(s) => header_contains(m, "from", s),
        Subject(s) => header_contains(m, "subject", s),
        To(s) => header_contains(m, "to", s),
        Header(name, s) => header_contains(m, name, s),
        Body(s) => contains(&m.body_text(), s),
        Text(s) => {
            contains(&String::from_utf8_lossy(m.header_block()), s)
                || contains(&m.body_text(), s)
        }

        Before(d) => m.internal_date < *d,
        On(d) => m.internal_date == *d,
        Since(d) => m.internal_date >= *d,
        SentBefore(d) => m.sent_date().map_or(false, |s| s < *d),
        SentOn(d) => m.sent_date().map_or(false, |s| s == *d),
        SentSince(d) => m.sent_date().map_or(false, |s| s >= *d),

        Larger(n) => m.raw.len() as u64 > *n,
        Smaller(n) => (m.raw.len() as u64) < *n,

        Uid(set) => set.contains(ctx.uid, ctx.largest_uid),
        Sequence(set) => set.contains(ctx.seq, ctx.count),
    }
}
