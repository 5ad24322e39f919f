//! CLI scenario tests that need no database: config hashing, the reset
//! guardrail, and audit chain verification run entirely against local files.

use assert_cmd::Command;
use ddk_audit::{AuditEntry, AuditSink, JsonlAuditSink};
use predicates::prelude::*;

#[test]
fn config_hash_ignores_key_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let a = dir.path().join("a.yaml");
    let b = dir.path().join("b.yaml");
    std::fs::write(
        &a,
        "daemon:\n  bind_addr: 0.0.0.0:9000\naudit:\n  hash_chain: true\n",
    )?;
    std::fs::write(
        &b,
        "audit:\n  hash_chain: true\ndaemon:\n  bind_addr: 0.0.0.0:9000\n",
    )?;

    let out_a = Command::cargo_bin("ddk-cli")?
        .args(["config-hash", a.to_str().unwrap()])
        .output()?;
    let out_b = Command::cargo_bin("ddk-cli")?
        .args(["config-hash", b.to_str().unwrap()])
        .output()?;
    assert!(out_a.status.success());
    assert!(out_b.status.success());

    let first = |bytes: &[u8]| String::from_utf8_lossy(bytes).lines().next().unwrap().to_string();
    let hash_a = first(&out_a.stdout);
    let hash_b = first(&out_b.stdout);
    assert!(hash_a.starts_with("config_hash="), "got: {hash_a}");
    assert_eq!(hash_a, hash_b, "key order must not change the hash");
    Ok(())
}

#[test]
fn consistency_reset_refuses_without_yes() -> anyhow::Result<()> {
    // Bails before any database connection is attempted.
    Command::cargo_bin("ddk-cli")?
        .args([
            "consistency",
            "reset",
            "--facility",
            "3fa85f64-5717-4562-b3fc-2c963f66afa6",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("REFUSING RESET"));
    Ok(())
}

#[test]
fn audit_verify_confirms_a_chained_log() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("audit.jsonl");
    {
        let sink = JsonlAuditSink::new(&path, true)?;
        sink.log(AuditEntry::new(
            "attendance",
            "r-1",
            "ingest",
            serde_json::json!({ "n": 1 }),
            "gate-7",
        ));
        sink.log(AuditEntry::new(
            "attendance",
            "r-2",
            "ingest",
            serde_json::json!({ "n": 2 }),
            "gate-7",
        ));
    }

    Command::cargo_bin("ddk-cli")?
        .args(["audit", "verify", "--path", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("verified=true lines=2"));
    Ok(())
}

#[test]
fn audit_verify_flags_a_tampered_line() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("audit.jsonl");
    {
        let sink = JsonlAuditSink::new(&path, true)?;
        sink.log(AuditEntry::new(
            "attendance",
            "r-1",
            "ingest",
            serde_json::json!({ "n": 1 }),
            "gate-7",
        ));
        sink.log(AuditEntry::new(
            "attendance",
            "r-2",
            "ingest",
            serde_json::json!({ "n": 2 }),
            "gate-7",
        ));
    }

    // Flip a payload digit in the second line; the self-hash no longer matches.
    let content = std::fs::read_to_string(&path)?;
    std::fs::write(&path, content.replace("\"n\":2", "\"n\":9"))?;

    Command::cargo_bin("ddk-cli")?
        .args(["audit", "verify", "--path", path.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("verified=false"));
    Ok(())
}
