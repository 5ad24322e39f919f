//! Append-only audit trail for attendance and leave mutations.
//!
//! Every state-changing operation reports an [`AuditEntry`] through the
//! [`AuditSink`] port. Sinks are strictly best-effort: a failing sink is
//! logged and swallowed, never surfaced as the triggering operation's error.
//! The file-backed sink writes JSON Lines with an optional hash chain so an
//! operator can prove the trail was not edited after the fact.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// AuditEntry — what an engine reports
// ---------------------------------------------------------------------------

/// One domain action on one entity, as reported by an engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entity family: "attendance" | "leave" | "person" | "automark".
    pub entity: String,
    /// Id of the affected row (record id, leave id, person id, ...).
    pub ref_id: String,
    /// Verb: "ingest", "approve", "early_return", "reset_states", ...
    pub action: String,
    pub payload: Value,
    pub actor: String,
    pub facility_id: Option<Uuid>,
    pub reason: Option<String>,
}

impl AuditEntry {
    pub fn new(
        entity: impl Into<String>,
        ref_id: impl Into<String>,
        action: impl Into<String>,
        payload: Value,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            ref_id: ref_id.into(),
            action: action.into(),
            payload,
            actor: actor.into(),
            facility_id: None,
            reason: None,
        }
    }

    pub fn facility(mut self, facility_id: Uuid) -> Self {
        self.facility_id = Some(facility_id);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// ---------------------------------------------------------------------------
// AuditSink — the port
// ---------------------------------------------------------------------------

/// Best-effort audit port. Implementations own their failure handling;
/// a caller's primary write must never fail because auditing did.
pub trait AuditSink: Send + Sync {
    fn log(&self, entry: AuditEntry);
}

/// Discards everything. Default sink in tests.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn log(&self, _entry: AuditEntry) {}
}

/// File-backed sink over [`AuditWriter`]; append failures are logged at
/// `warn` and swallowed.
pub struct JsonlAuditSink {
    writer: Mutex<AuditWriter>,
}

impl JsonlAuditSink {
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        Ok(Self {
            writer: Mutex::new(AuditWriter::new(path, hash_chain)?),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn log(&self, entry: AuditEntry) {
        let mut writer = match self.writer.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writer.append(entry) {
            tracing::warn!(error = %err, "audit append failed; entry dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// AuditLine — what lands in the file
// ---------------------------------------------------------------------------

/// One persisted line: the entry plus id, timestamp and chain hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLine {
    pub entry_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub entity: String,
    pub ref_id: String,
    pub action: String,
    pub payload: Value,
    pub actor: String,
    pub facility_id: Option<Uuid>,
    pub reason: Option<String>,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

// ---------------------------------------------------------------------------
// AuditWriter
// ---------------------------------------------------------------------------

/// Append-only JSONL writer. With `hash_chain` enabled each line carries
/// `hash_prev` (previous line's `hash_self`) and its own `hash_self`.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Lines in the file so far; part of the entry-id derivation.
    seq: u64,
}

impl AuditWriter {
    /// Creates the writer and ensures the parent directory exists. An
    /// existing log is resumed: the chain tail and sequence counter come
    /// from its last line, so appends from a fresh process — a daemon
    /// restart, a CLI command — extend the chain instead of restarting it.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        let (seq, last_hash) = resume_point(&path)?;
        Ok(Self {
            path,
            hash_chain,
            last_hash,
            seq,
        })
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one entry; returns the persisted line.
    pub fn append(&mut self, entry: AuditEntry) -> Result<AuditLine> {
        let ts_utc = Utc::now();
        // Entry id is derived from chain position, not RNG, so replaying the
        // same log after restart reproduces the same ids.
        let entry_id = derive_entry_id(self.last_hash.as_deref(), self.seq);
        self.seq += 1;

        let mut line = AuditLine {
            entry_id,
            ts_utc,
            entity: entry.entity,
            ref_id: entry.ref_id,
            action: entry.action,
            payload: entry.payload,
            actor: entry.actor,
            facility_id: entry.facility_id,
            reason: entry.reason,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            line.hash_prev = self.last_hash.clone();
            let self_hash = compute_line_hash(&line)?;
            line.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let serialized = canonical_json_line(&line)?;
        append_line(&self.path, &serialized)?;

        Ok(line)
    }
}

/// Tail of an existing log: (lines written so far, last line's `hash_self`).
/// A missing or empty file starts a fresh chain.
fn resume_point(path: &Path) -> Result<(u64, Option<String>)> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok((0, None)),
        Err(err) => {
            return Err(err).with_context(|| format!("read audit log {:?}", path));
        }
    };
    let mut seq = 0u64;
    let mut last_hash = None;
    for (i, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line: AuditLine = serde_json::from_str(trimmed)
            .with_context(|| format!("resume: parse audit line {}", i + 1))?;
        seq += 1;
        last_hash = line.hash_self;
    }
    Ok((seq, last_hash))
}

/// Deterministic entry id: v5 UUID over the chain tail + sequence number.
fn derive_entry_id(last_hash: Option<&str>, seq: u64) -> Uuid {
    let name = format!("{}|{}", last_hash.unwrap_or("genesis"), seq);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Write a single line with trailing newline.
fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
/// One line == one entry.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit line failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash of the canonical JSON of a line WITHOUT `hash_self` (no self-reference).
pub fn compute_line_hash(line: &AuditLine) -> Result<String> {
    let mut clone = line.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify the hash chain of an audit log file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] over in-memory JSONL content.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let line: AuditLine = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit line {}", i + 1))?;

        line_count += 1;

        if line.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, line.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = line.hash_self {
            let recomputed = compute_line_hash(&line)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed, recomputed
                    ),
                });
            }
        }

        prev_hash = line.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// The entire chain is valid.
    Valid { lines: usize },
    /// The chain is broken at the given line.
    Broken { line: usize, reason: String },
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
