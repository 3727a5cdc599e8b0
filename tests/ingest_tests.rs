//! End-to-end ingestion tests over real message fixtures.

use std::path::Path;

use mailindex::config::Limits;
use mailindex::error::IndexError;
use mailindex::ingest::{ingest_message, visit_folder, VisitStats};
use mailindex::store::MailStore;

const SIMPLE: &[u8] = include_bytes!("fixtures/simple.eml");
const MULTIPART: &[u8] = include_bytes!("fixtures/multipart.eml");
const HTML_ONLY: &[u8] = include_bytes!("fixtures/html_only.eml");

fn store() -> MailStore {
    MailStore::open_in_memory().unwrap()
}

fn ingest(store: &mut MailStore, raw: &[u8], path: &str) -> bool {
    ingest_message(store, raw, path, &Limits::default()).unwrap()
}

#[test]
fn simple_message_end_to_end() {
    let mut s = store();
    assert!(ingest(&mut s, SIMPLE, "/mail/simple.eml"));

    let msg = s.message(1).unwrap();
    assert_eq!(msg.message_id, "<simple-1@example.com>");
    assert_eq!(msg.subject.as_deref(), Some("Quarterly report"));
    assert_eq!(msg.original_path, "/mail/simple.eml");
    assert!(msg.date.is_some());
    assert!(msg.content_text.as_deref().unwrap().contains("quarterly figures"));
    assert!(msg.indexing_log.is_none());

    // Author resolved to an address record carrying the display name
    let author_email: String = s
        .conn()
        .query_row(
            "SELECT email FROM addresses WHERE id = ?1",
            [msg.author_id.unwrap()],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(author_email, "alice@example.com");

    // Promoted headers do not reappear as header rows
    let names: Vec<String> = s
        .conn()
        .prepare("SELECT name FROM headers WHERE message_id = ?1")
        .unwrap()
        .query_map([msg.id], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(names.iter().any(|n| n.eq_ignore_ascii_case("X-Mailer")));
    assert!(!names.iter().any(|n| n.eq_ignore_ascii_case("Subject")));
}

#[test]
fn recipients_are_split_by_list() {
    let mut s = store();
    ingest(&mut s, SIMPLE, "/mail/simple.eml");

    let list = |kind: &str| -> Vec<String> {
        s.conn()
            .prepare(
                "SELECT a.email FROM recipients r
                 JOIN addresses a ON a.id = r.address_id
                 WHERE r.list_kind = ?1 ORDER BY r.position",
            )
            .unwrap()
            .query_map([kind], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    };
    assert_eq!(list("to"), vec!["bob@example.com", "carol@example.com"]);
    assert_eq!(list("cc"), vec!["dave@example.com"]);
}

#[test]
fn dedup_by_path_and_message_id() {
    let mut s = store();
    assert!(ingest(&mut s, SIMPLE, "/mail/simple.eml"));
    // Same path again
    assert!(!ingest(&mut s, SIMPLE, "/mail/simple.eml"));
    // Same Message-ID under a new path
    assert!(!ingest(&mut s, SIMPLE, "/mail/copy-of-simple.eml"));
    assert_eq!(s.stats().unwrap().messages, 1);
}

#[test]
fn multipart_bodies_and_attachment() {
    let mut s = store();
    ingest(&mut s, MULTIPART, "/mail/multipart.eml");

    let msg = s.message(1).unwrap();
    assert!(msg.content_text.as_deref().unwrap().contains("report attached"));
    assert!(msg.content_html.as_deref().unwrap().contains("<b>report</b>"));

    let stats = s.stats().unwrap();
    assert_eq!(stats.attachments, 1);

    let att = s.attachment(1).unwrap();
    assert_eq!(att.file_name.as_deref(), Some("report.pdf"));
    assert_eq!(att.content_type.as_deref(), Some("application/pdf"));
    assert!(att.content.starts_with(b"%PDF-1.4"));
}

#[test]
fn html_only_message_gets_searchable_text() {
    let mut s = store();
    ingest(&mut s, HTML_ONLY, "/mail/digest.eml");

    let msg = s.message(1).unwrap();
    let text = msg.content_text.unwrap();
    assert!(text.contains("harbour bridge"));
    assert!(!text.contains('<'));
    assert!(msg.content_html.unwrap().contains("<html>"));
}

#[test]
fn search_covers_subject_and_both_bodies() {
    let mut s = store();
    ingest(&mut s, SIMPLE, "/mail/simple.eml");
    ingest(&mut s, MULTIPART, "/mail/multipart.eml");
    ingest(&mut s, HTML_ONLY, "/mail/digest.eml");

    // Subject word
    let hits = s.search("quarterly", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message_id, "<simple-1@example.com>");

    // Word only present in the converted HTML body
    let hits = s.search("harbour", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message_id, "<digest-1@example.org>");

    assert!(s.search("zanzibar", 10).unwrap().is_empty());
}

#[test]
fn missing_message_id_synthesized_and_stable() {
    let mut s = store();
    let raw = b"From: a@b.c\nSubject: anonymous\n\nbody text\n";
    assert!(ingest(&mut s, raw, "/mail/inbox/1234.eml"));
    // Re-running the same file dedups through the synthesized id
    assert!(!ingest(&mut s, raw, "/mail/elsewhere/1234.eml"));

    let msg = s.message(1).unwrap();
    assert_eq!(msg.message_id, "<none>:1234.eml");
}

#[test]
fn oversized_body_shrinks_until_it_fits() {
    let mut s = store();
    s.set_record_size_limit(1200);

    let prose = "plain words ".repeat(40);
    let links = "https://example.com/some/very/long/tracking/path?id=12345 ".repeat(30);
    let raw = format!("From: a@b.c\nMessage-ID: <big@x>\n\n{prose}{links}\n");
    assert!(ingest(&mut s, raw.as_bytes(), "/mail/big.eml"));

    let msg = s.message(1).unwrap();
    let text = msg.content_text.unwrap();
    assert!(text.len() <= 1200);
    assert!(!text.contains("https://"));
    assert!(msg.indexing_log.unwrap().contains("Stripped links"));
}

#[test]
fn unshrinkable_message_fails_whole() {
    let mut s = store();
    s.set_record_size_limit(500);

    let html = format!("<p>{}</p>", "y".repeat(3000));
    let raw = format!("From: a@b.c\nContent-Type: text/html\nMessage-ID: <huge@x>\n\n{html}\n");
    let err = ingest_message(&mut s, raw.as_bytes(), "/mail/huge.eml", &Limits::default())
        .unwrap_err();
    assert!(matches!(err, IndexError::RecordTooLarge { .. }));

    // Rolled back: no partial rows of any kind
    let stats = s.stats().unwrap();
    assert_eq!(stats.messages, 0);
    assert_eq!(stats.addresses, 0);
}

#[test]
fn folder_walk_over_fixture_tree() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("archive");
    std::fs::create_dir(&sub).unwrap();
    std::fs::write(dir.path().join("simple.eml"), SIMPLE).unwrap();
    std::fs::write(sub.join("multipart.eml"), MULTIPART).unwrap();
    std::fs::write(sub.join("broken.eml"), b"").unwrap();

    let mut s = store();
    let stats = visit_folder(&mut s, dir.path(), &Limits::default(), false, None).unwrap();
    assert_eq!(stats, VisitStats { created: 2, existing: 0, failed: 1 });

    // A second pass reports the same files as existing
    let again = visit_folder(&mut s, dir.path(), &Limits::default(), false, None).unwrap();
    assert_eq!(again, VisitStats { created: 0, existing: 2, failed: 1 });
}

#[test]
fn folder_walk_stop_on_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a-broken.eml"), b"").unwrap();
    std::fs::write(dir.path().join("z-good.eml"), SIMPLE).unwrap();

    let mut s = store();
    let err = visit_folder(&mut s, dir.path(), &Limits::default(), true, None).unwrap_err();
    assert!(matches!(err, IndexError::Mime(_)));
    assert_eq!(s.stats().unwrap().messages, 0);
}

#[test]
fn display_names_accumulate_across_messages() {
    let mut s = store();
    ingest(
        &mut s,
        b"From: Alice Example <alice@example.com>\nMessage-ID: <n1@x>\n\nhi\n",
        "/mail/n1.eml",
    );
    ingest(
        &mut s,
        b"From: Ali <ALICE@EXAMPLE.COM>\nMessage-ID: <n2@x>\n\nhi again\n",
        "/mail/n2.eml",
    );

    let names: Option<String> = s
        .conn()
        .query_row(
            "SELECT display_names FROM addresses WHERE email = 'alice@example.com' COLLATE NOCASE",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(names.as_deref(), Some("Alice Example,Ali"));
    assert_eq!(s.stats().unwrap().addresses, 1);
}

#[test]
fn store_reopens_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("index.db");

    {
        let mut s = MailStore::open(&db).unwrap();
        ingest(&mut s, SIMPLE, "/mail/simple.eml");
    }

    let s = MailStore::open(&db).unwrap();
    assert_eq!(s.stats().unwrap().messages, 1);
    assert_eq!(s.search("quarterly", 10).unwrap().len(), 1);
    assert!(Path::new(&db).exists());
}
