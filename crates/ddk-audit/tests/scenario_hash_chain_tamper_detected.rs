//! The hash chain makes after-the-fact edits provable: rewriting a payload
//! breaks that line's self-hash, and removing a line breaks the prev-hash
//! link of whatever follows it. Verification reports the first broken line.

use ddk_audit::{verify_hash_chain, verify_hash_chain_str, AuditEntry, AuditWriter, VerifyResult};
use serde_json::json;
use std::path::Path;

fn write_chain(path: &Path, n: usize) {
    let mut writer = AuditWriter::new(path, true).expect("open writer");
    for i in 0..n {
        writer
            .append(
                AuditEntry::new(
                    "leave",
                    format!("leave-{i}"),
                    "approve",
                    json!({ "window": [i, i + 4] }),
                    "supervisor.iyer",
                )
                .reason("family visit"),
            )
            .expect("append");
    }
}

#[test]
fn intact_chain_verifies_with_the_full_line_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    write_chain(&path, 5);

    assert_eq!(
        verify_hash_chain(&path).unwrap(),
        VerifyResult::Valid { lines: 5 }
    );
}

#[test]
fn edited_payload_breaks_the_self_hash_of_that_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    write_chain(&path, 5);

    // Rewrite the third line's payload without touching its recorded hash.
    let content = std::fs::read_to_string(&path).unwrap();
    let edited: Vec<String> = content
        .lines()
        .enumerate()
        .map(|(i, raw)| {
            if i != 2 {
                return raw.to_string();
            }
            let mut line: serde_json::Value = serde_json::from_str(raw).unwrap();
            line["payload"]["window"] = json!([0, 30]);
            serde_json::to_string(&line).unwrap()
        })
        .collect();

    let result = verify_hash_chain_str(&(edited.join("\n") + "\n")).unwrap();
    let VerifyResult::Broken { line, reason } = result else {
        panic!("edited chain must not verify");
    };
    assert_eq!(line, 3);
    assert!(reason.contains("hash_self mismatch"), "got: {reason}");
}

#[test]
fn removed_line_breaks_the_link_to_its_successor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    write_chain(&path, 5);

    let content = std::fs::read_to_string(&path).unwrap();
    let without_third: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 2)
        .map(|(_, l)| l)
        .collect();

    let result = verify_hash_chain_str(&(without_third.join("\n") + "\n")).unwrap();
    let VerifyResult::Broken { line, reason } = result else {
        panic!("chain with a missing line must not verify");
    };
    // The old fourth line now sits at position three and still names the
    // removed line's hash as its predecessor.
    assert_eq!(line, 3);
    assert!(reason.contains("hash_prev mismatch"), "got: {reason}");
}

#[test]
fn chain_survives_a_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    // Two writer sessions on the same file, as when the daemon restarts or
    // a CLI command appends to the daemon's log between runs.
    write_chain(&path, 3);
    write_chain(&path, 2);

    assert_eq!(
        verify_hash_chain(&path).unwrap(),
        VerifyResult::Valid { lines: 5 }
    );

    // The first line of the second session links to the first session's tail.
    let content = std::fs::read_to_string(&path).unwrap();
    let fourth: serde_json::Value = serde_json::from_str(content.lines().nth(3).unwrap()).unwrap();
    assert!(fourth["hash_prev"].is_string(), "no fresh chain mid-file");
}

#[test]
fn empty_and_single_entry_logs_verify() {
    let dir = tempfile::tempdir().unwrap();

    let empty = dir.path().join("empty.jsonl");
    std::fs::write(&empty, "").unwrap();
    assert_eq!(
        verify_hash_chain(&empty).unwrap(),
        VerifyResult::Valid { lines: 0 }
    );

    let single = dir.path().join("single.jsonl");
    write_chain(&single, 1);
    assert_eq!(
        verify_hash_chain(&single).unwrap(),
        VerifyResult::Valid { lines: 1 }
    );
}
