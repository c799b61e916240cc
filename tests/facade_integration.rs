use std::collections::BTreeSet;

use mailbox_tools::testing::{FakeMessage, FakeServer, Op};
use mailbox_tools::{Error, FolderFlag, MailboxFacade, MessageBody, MessageUid, SessionGuard};

fn open(server: &FakeServer) -> MailboxFacade {
    let session = SessionGuard::open(Box::new(server.connector())).unwrap();
    MailboxFacade::new("me@example.com", "Drafts", session)
}

fn paths(mailbox: &MailboxFacade, base: &str, pattern: &str) -> Vec<String> {
    mailbox
        .list_mailboxes(base, pattern)
        .unwrap()
        .into_iter()
        .map(|folder| folder.path)
        .collect()
}

fn search(mailbox: &MailboxFacade, criteria: &str) -> BTreeSet<MessageUid> {
    let found = mailbox.search("INBOX", criteria).unwrap();
    found.into_iter().collect()
}

fn uids(values: &[u32]) -> Vec<MessageUid> {
    values.iter().copied().map(MessageUid::from).collect()
}

fn set(values: &[u32]) -> BTreeSet<MessageUid> {
    uids(values).into_iter().collect()
}

#[test]
fn list_from_root_and_below_a_folder() {
    let server = FakeServer::new()
        .folder("INBOX")
        .folder("INBOX/Trash")
        .folder("Sent");
    let mailbox = open(&server);

    let everything = paths(&mailbox, "", "*");
    assert_eq!(everything, vec!["INBOX", "INBOX/Trash", "Sent"]);
    assert_eq!(paths(&mailbox, "INBOX", "*"), vec!["INBOX/Trash"]);
    assert_eq!(paths(&mailbox, "INBOX/", "*"), vec!["INBOX/Trash"]);
    assert_eq!(paths(&mailbox, "", "%"), vec!["INBOX", "Sent"]);
    assert_eq!(paths(&mailbox, "", "S*"), vec!["Sent"]);
    assert!(paths(&mailbox, "Sent", "*").is_empty());
}

#[test]
fn list_uses_the_server_delimiter() {
    let server = FakeServer::new()
        .delimiter('.')
        .folder("INBOX")
        .folder("INBOX.Archive")
        .folder("INBOX.Archive.2023")
        .folder("INBOXES");
    let mailbox = open(&server);

    assert_eq!(
        paths(&mailbox, "INBOX", "*"),
        vec!["INBOX.Archive", "INBOX.Archive.2023"]
    );
    assert_eq!(paths(&mailbox, "INBOX", "%"), vec!["INBOX.Archive"]);

    let folders = mailbox.list_mailboxes("", "INBOX.Archive").unwrap();
    assert_eq!(folders[0].delimiter, Some('.'));
    assert!(folders[0].flags.contains(&FolderFlag::HasChildren));
}

#[test]
fn list_leaves_selection_alone() {
    let server = FakeServer::standard();
    let mailbox = open(&server);
    let before = server.selected();

    let folders = mailbox.list_mailboxes("", "*").unwrap();
    let drafts = folders.iter().find(|f| f.path == "Drafts").unwrap();
    assert!(drafts.flags.contains(&FolderFlag::Drafts));

    assert_eq!(server.selected(), before);
    assert_eq!(server.calls(Op::Select), 0);
}

#[test]
fn conjunction_is_intersection() {
    let mailbox = open(&FakeServer::standard());

    let all = search(&mailbox, "SEEN UNANSWERED FLAGGED");
    let seen = search(&mailbox, "SEEN");
    let unanswered = search(&mailbox, "UNANSWERED");
    let flagged = search(&mailbox, "FLAGGED");

    let expected: BTreeSet<_> = &(&seen & &unanswered) & &flagged;
    assert_eq!(all, expected);
    assert_eq!(all, set(&[2, 3]));
}

#[test]
fn disjunction_is_union() {
    let mailbox = open(&FakeServer::standard());

    let either = search(&mailbox, "OR FROM alice@example.com FROM bob@example.com");
    let alice = search(&mailbox, "FROM alice@example.com");
    let bob = search(&mailbox, "FROM bob@example.com");

    assert_eq!(either, &alice | &bob);
    assert_eq!(either.len(), 4);
}

#[test]
fn or_binds_two_keys_and_the_rest_is_anded() {
    let mailbox = open(&FakeServer::standard());

    let grouped = search(&mailbox, "OR FROM alice FROM bob FLAGGED");
    let explicit = search(&mailbox, "(OR FROM alice FROM bob) FLAGGED");
    assert_eq!(grouped, explicit);
    assert_eq!(grouped, set(&[2, 5]));

    let three_way = search(&mailbox, "OR FROM alice OR FROM bob FROM carol");
    assert_eq!(three_way, search(&mailbox, "ALL"));
}

#[test]
fn not_negates_the_whole_group() {
    let mailbox = open(&FakeServer::standard());

    let not_both = search(&mailbox, "NOT (SEEN FLAGGED)");
    let both = search(&mailbox, "SEEN FLAGGED");
    let all = search(&mailbox, "ALL");
    assert_eq!(not_both, &all - &both);

    // not the same as negating each key
    assert_ne!(not_both, search(&mailbox, "NOT SEEN NOT FLAGGED"));
}

#[test]
fn search_only_looks_in_the_named_folder() {
    let mailbox = open(&FakeServer::standard());
    assert_eq!(
        mailbox.search("Sent", "SUBJECT report").unwrap(),
        uids(&[1])
    );
    assert!(mailbox.search("INBOX/Trash", "ALL").unwrap().is_empty());
}

#[test]
fn search_in_a_missing_folder() {
    let server = FakeServer::standard();
    let mailbox = open(&server);
    assert!(matches!(
        mailbox.search("Archive", "ALL"),
        Err(Error::FolderNotFound(ref f)) if f == "Archive"
    ));
    assert_eq!(server.selected().as_deref(), Some("INBOX"));

    let denied = FakeServer::standard().deny("Sent");
    let mailbox = open(&denied);
    assert!(matches!(
        mailbox.search("Sent", "ALL"),
        Err(Error::FolderAccessDenied(_))
    ));
}

#[test]
fn headers_and_text_are_one_batched_fetch_each() {
    let server = FakeServer::standard();
    let mailbox = open(&server);
    let wanted = uids(&[1, 3]);

    let headers = mailbox.fetch_headers("INBOX", &wanted).unwrap();
    assert_eq!(server.calls(Op::Fetch), 1);
    assert_eq!(headers.len(), 2);
    assert_eq!(headers[0].headers["subject"], vec!["Quarterly report"]);

    let records = mailbox.fetch_messages("INBOX", &wanted, true).unwrap();
    assert!(records.iter().all(|r| r.body == MessageBody::HeadersOnly));
    assert_eq!(server.calls(Op::Fetch), 2);

    let text = mailbox.fetch_text("INBOX", &wanted).unwrap();
    assert_eq!(server.calls(Op::Fetch), 3);
    assert!(text[0].text.contains("Numbers attached."));
    assert!(text[1].text.contains("Please find the invoice attached."));
    // attachments are not part of the body
    assert!(!text[1].text.contains("TOTAL"));
}

#[test]
fn html_and_size() {
    let server = FakeServer::standard();
    let mailbox = open(&server);

    let html = mailbox.fetch_html("INBOX", &uids(&[3, 5])).unwrap();
    assert_eq!(html.len(), 2);
    assert!(html[0].html.contains("<p>Please find the invoice"));
    assert!(html[1].html.contains("<b>main</b> is red"));

    let plain = mailbox.fetch_html("INBOX", &uids(&[1])).unwrap();
    assert_eq!(plain[0].html, "");

    let sizes = mailbox.fetch_size("INBOX", &uids(&[1, 2])).unwrap();
    assert!(sizes.iter().all(|s| s.size.unwrap_or(0) > 0));
}

#[test]
fn repeated_headers_keep_every_value() {
    let raw = "Received: from a\r\nReceived: from b\r\n\
               From: x@example.com\r\nSubject: hops\r\n\r\nbody\r\n";
    let server = FakeServer::new()
        .folder("INBOX")
        .message("INBOX", FakeMessage::raw(raw));
    let mailbox = open(&server);
    let headers = mailbox.fetch_headers("INBOX", &uids(&[1])).unwrap();
    assert_eq!(headers[0].headers["received"], vec!["from a", "from b"]);
}

#[test]
fn missing_uids_are_left_out() {
    let mailbox = open(&FakeServer::standard());
    let text = mailbox.fetch_text("INBOX", &uids(&[2, 99])).unwrap();
    assert_eq!(text.len(), 1);
    assert_eq!(text[0].uid, MessageUid::from(2));
}

#[test]
fn status_is_idempotent_and_keeps_selection() {
    let server = FakeServer::standard();
    let mailbox = open(&server);
    let before = server.selected();

    let first = mailbox.mailbox_status("INBOX").unwrap();
    let second = mailbox.mailbox_status("INBOX").unwrap();
    assert_eq!(first, second);
    assert_eq!((first.messages, first.recent, first.unseen), (5, 1, 2));

    let sent = mailbox.mailbox_status("Sent").unwrap();
    assert_eq!(sent.messages, 1);

    assert_eq!(server.selected(), before);
    assert_eq!(server.calls(Op::Select), 0);
    assert!(matches!(
        mailbox.mailbox_status("Nope"),
        Err(Error::FolderNotFound(_))
    ));
}

#[test]
fn every_folder_operation_restores_the_selection() {
    let server = FakeServer::standard();
    let mailbox = open(&server);
    let before = server.selected();

    mailbox.search("Sent", "ALL").unwrap();
    assert_eq!(server.selected(), before);
    mailbox.fetch_text("Sent", &uids(&[1])).unwrap();
    assert_eq!(server.selected(), before);
    let _ = mailbox.search("Missing", "ALL");
    assert_eq!(server.selected(), before);
    assert!(mailbox.secondary_failures().is_empty());
}

#[test]
fn draft_is_appended_with_the_draft_flag() {
    let server = FakeServer::standard();
    let mailbox = open(&server);
    let reply = b"From: me@example.com\r\nTo: alice@example.com\r\n\
                  Subject: Re: Quarterly report\r\n\
                  In-Reply-To: <quarterly.report@example.com>\r\n\r\nLooks good.\r\n";

    let date = chrono::DateTime::parse_from_rfc3339("2024-04-01T12:00:00+02:00").unwrap();
    let outcome = mailbox.create_draft_message(reply, Some(date)).unwrap();
    assert_eq!(outcome.folder, "Drafts");
    assert_eq!(outcome.uids, server.uids("Drafts"));

    let criteria = "DRAFT ON 1-Apr-2024 HEADER In-Reply-To quarterly.report";
    let found = mailbox.search("Drafts", criteria).unwrap();
    assert_eq!(found, uids(&outcome.uids));
    assert_eq!(server.selected().as_deref(), Some("INBOX"));
}

#[test]
fn draft_to_a_missing_drafts_folder() {
    let server = FakeServer::new().folder("INBOX");
    let session = SessionGuard::open(Box::new(server.connector())).unwrap();
    let mailbox = MailboxFacade::new("me@example.com", "Brouillons", session);
    assert!(matches!(
        mailbox.create_draft_message(b"Subject: x\r\n\r\ny\r\n", None),
        Err(Error::FolderNotFound(ref f)) if f == "Brouillons"
    ));
}
