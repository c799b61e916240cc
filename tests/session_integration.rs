use std::sync::Arc;
use std::thread;

use mailbox_tools::testing::{FakeMessage, FakeServer, Op};
use mailbox_tools::{
    Error, Liveness, MailboxFacade, MessageUid, SecondaryFailure, SessionGuard, StoreError,
};

fn open(server: &FakeServer) -> MailboxFacade {
    let session = SessionGuard::open(Box::new(server.connector())).unwrap();
    MailboxFacade::new("me@example.com", "Drafts", session)
}

#[test]
fn dead_connection_is_replaced_transparently() {
    let server = FakeServer::standard();
    let mailbox = open(&server);
    assert_eq!(mailbox.search("INBOX", "FLAGGED").unwrap().len(), 3);

    server.drop_connections();
    assert_eq!(mailbox.search("INBOX", "FLAGGED").unwrap().len(), 3);
    assert_eq!(server.calls(Op::Connect), 2);

    // closing the dead connection failed; that is reported on the side
    let secondary = mailbox.secondary_failures();
    assert_eq!(secondary.len(), 1);
    match &secondary[0] {
        SecondaryFailure::Close(e) => assert!(e.is_connection_failure()),
        other => panic!("unexpected secondary failure: {}", other),
    }
}

#[test]
fn failed_reconnect_is_reported_then_retried() {
    let server = FakeServer::standard();
    let mailbox = open(&server);

    server.drop_connections();
    server.refuse_connects(1);
    assert!(matches!(
        mailbox.mailbox_status("INBOX"),
        Err(Error::SessionUnavailable(StoreError::Authentication(_)))
    ));
    assert_eq!(server.calls(Op::Status), 0);

    // nothing is left half-usable: the next call starts over and succeeds
    let status = mailbox.mailbox_status("INBOX").unwrap();
    assert_eq!(status.messages, 5);
    assert_eq!(server.calls(Op::Connect), 3);
}

#[test]
fn lazy_session_connects_on_first_operation() {
    let server = FakeServer::standard();
    let session = SessionGuard::new(Box::new(server.connector()));
    assert_eq!(session.liveness(), Liveness::Unknown);
    let mailbox = MailboxFacade::new("me@example.com", "Drafts", session);

    assert_eq!(mailbox.who_am_i(), "me@example.com");
    assert_eq!(server.calls(Op::Connect), 0);

    mailbox.list_mailboxes("", "*").unwrap();
    assert_eq!(server.calls(Op::Connect), 1);
}

#[test]
fn unreachable_server_at_startup() {
    let server = FakeServer::standard();
    let refused = StoreError::Connection("connection refused".into());
    server.fail_next(Op::Connect, refused);
    let err = SessionGuard::open(Box::new(server.connector())).err().unwrap();
    assert!(matches!(
        err,
        Error::SessionUnavailable(StoreError::Connection(_))
    ));
}

#[test]
fn timeout_mid_operation_is_surfaced_and_next_call_reconnects() {
    let server = FakeServer::standard();
    let mailbox = open(&server);
    server.fail_next(Op::Search, StoreError::Connection("timed out".into()));

    let err = mailbox.search("Sent", "ALL").unwrap_err();
    assert!(matches!(err, Error::MailStore(StoreError::Connection(_))));
    assert_eq!(server.selected().as_deref(), Some("INBOX"));

    let found = mailbox.search("Sent", "ALL").unwrap();
    assert_eq!(found, vec![MessageUid::from(1)]);
    assert_eq!(server.calls(Op::Connect), 2);
}

#[test]
fn appends_are_not_replayed() {
    let server = FakeServer::standard();
    let mailbox = open(&server);
    server.fail_next(Op::Append, StoreError::Connection("broken pipe".into()));

    assert!(mailbox
        .create_draft_message(b"Subject: once\r\n\r\nbody\r\n", None)
        .is_err());
    assert_eq!(server.calls(Op::Append), 1);
    assert!(server.uids("Drafts").is_empty());
}

#[test]
fn concurrent_operations_never_see_each_others_folder() {
    let mut server = FakeServer::new()
        .folder("INBOX")
        .folder("Work")
        .folder("Home");
    for i in 0..5 {
        let task = FakeMessage::new("boss@example.com", &format!("task {}", i), "do it");
        let dinner = FakeMessage::new("mom@example.com", &format!("dinner {}", i), "come");
        server = server.message("Work", task).message("Home", dinner);
    }
    let extra = FakeMessage::new("mom@example.com", "extra", "hi");
    server = server.message("Home", extra);
    let mailbox = Arc::new(open(&server));

    let workers: Vec<_> = ["Work", "Home"]
        .into_iter()
        .map(|folder| {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                for _ in 0..50 {
                    let found = mailbox.search(folder, "ALL").unwrap();
                    let expected = if folder == "Work" { 5 } else { 6 };
                    assert_eq!(found.len(), expected, "{} saw another folder", folder);

                    let headers = mailbox.fetch_headers(folder, &found).unwrap();
                    let sender = match folder {
                        "Work" => "boss@example.com",
                        _ => "mom@example.com",
                    };
                    assert!(headers.iter().all(|h| h.headers["from"] == vec![sender]));
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(server.selected().as_deref(), Some("INBOX"));
    assert!(mailbox.secondary_failures().is_empty());
}
