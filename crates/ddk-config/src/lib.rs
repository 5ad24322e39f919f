//! Layered YAML configuration for the attendance daemon and CLI.
//!
//! Later documents override earlier ones via recursive object merge. The
//! merged document is canonicalized and hashed so two operators can compare
//! effective configs by a single hex string. Secret-looking literal values
//! are rejected outright; config carries env-var NAMES, never credentials.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Known secret-like prefixes. If any leaf string in the effective config
/// starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // Stripe / OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

// ---------------------------------------------------------------------------
// Unused-key lint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Minimal set of unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Registry of JSON-pointer prefixes the code actually reads.
///
/// Must match [`DaemonSettings::from_config_json`]. A leaf under any listed
/// prefix counts as consumed; everything else is flagged by
/// [`report_unused_keys`]. Do not register sections speculatively.
pub fn consumed_pointers() -> &'static [&'static str] {
    &[
        "/daemon/bind_addr",
        "/daemon/stream_capacity",
        "/audit/path",
        "/audit/hash_chain",
        "/validator",
    ]
}

/// Produce an unused-key report for the effective config.
/// If `policy == Fail`, returns an error when unused keys exist.
/// If `policy == Warn`, always returns Ok(report).
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut consumed: BTreeSet<String> = BTreeSet::new();
    for p in consumed_pointers() {
        consumed.insert(normalize_pointer(p));
    }
    let consumed_prefixes: Vec<String> = consumed.iter().cloned().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = Vec::new();
    'leaf: for lp in leaves {
        for cp in &consumed_prefixes {
            if is_prefix_pointer(cp, &lp) {
                continue 'leaf;
            }
        }
        unused.push(lp);
    }

    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        // Keep message deterministic and copy/paste friendly.
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. \
            Remove them or update the consumed registry. First few: {}",
            report.unused_leaf_pointers.len(),
            preview_list(&report.unused_leaf_pointers, 12)
        );
    }

    Ok(report)
}

/// Normalize JSON pointer:
/// - must begin with "/"
/// - no trailing "/" unless it's just "/"
fn normalize_pointer(p: &str) -> String {
    let mut s = p.trim().to_string();
    if s.is_empty() {
        return "/".to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    while s.ends_with('/') && s.len() > 1 {
        s.pop();
    }
    s
}

/// Return true if `prefix` is a JSON-pointer prefix of `leaf`.
///
/// "/a/b" covers "/a/b" and "/a/b/c" but NOT "/a/bc". "/" covers everything.
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    if leaf == prefix {
        return true;
    }
    if leaf.starts_with(prefix) {
        // Boundary at the next char must be "/".
        return leaf
            .get(prefix.len()..prefix.len() + 1)
            .map(|c| c == "/")
            .unwrap_or(false);
    }
    false
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let take = items.iter().take(n).cloned().collect::<Vec<_>>();
    format!("{:?}", take)
}

// ---------------------------------------------------------------------------
// Layered loading + canonical hash
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    // Merge YAML docs in order: earlier docs are base, later docs override.
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    // serde_json's default map sorts keys, so compact serialization is already
    // canonical: the same effective config hashes identically regardless of
    // the order keys appeared in the YAML sources.
    let s = serde_json::to_string(v).context("canonical json serialize failed")?;
    Ok(s)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    hex::encode(out)
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(val) = v.pointer(&ptr) {
            if let Some(s) = val.as_str() {
                if looks_like_secret(s) {
                    bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
                }
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

// ---------------------------------------------------------------------------
// Typed settings view
// ---------------------------------------------------------------------------

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8640";
pub const DEFAULT_STREAM_CAPACITY: usize = 256;
pub const DEFAULT_AUDIT_PATH: &str = "dormdesk-audit.jsonl";

/// Anomaly-validator thresholds as configured. The daemon maps these onto the
/// validator crate's own config type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSettings {
    pub duplicate_window_secs: i64,
    pub short_stay_secs: i64,
    pub excessive_entries: usize,
    pub unusual_start_hour: u32,
    pub unusual_end_hour: u32,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            duplicate_window_secs: 120,
            short_stay_secs: 300,
            excessive_entries: 10,
            unusual_start_hour: 23,
            unusual_end_hour: 5,
        }
    }
}

/// Everything the daemon reads from the effective config. All keys are
/// optional; absent sections fall back to the defaults above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    /// `/daemon/bind_addr`
    pub bind_addr: String,
    /// `/daemon/stream_capacity` — broadcast buffer for the SSE stream.
    pub stream_capacity: usize,
    /// `/audit/path` — None (empty string in config) disables the file sink.
    pub audit_path: Option<String>,
    /// `/audit/hash_chain`
    pub audit_hash_chain: bool,
    /// `/validator/*`
    pub validator: ValidatorSettings,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            audit_path: Some(DEFAULT_AUDIT_PATH.to_string()),
            audit_hash_chain: true,
            validator: ValidatorSettings::default(),
        }
    }
}

impl DaemonSettings {
    /// Extract settings from the merged config document.
    ///
    /// Missing keys take defaults; present keys of the wrong type or out of
    /// bounds are errors rather than silent fallbacks, so a typo in an
    /// operator's override file cannot quietly revert to defaults.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = match str_at(cfg, "/daemon/bind_addr")? {
            Some(s) if s.trim().is_empty() => bail!("daemon.bind_addr must not be blank"),
            Some(s) => s,
            None => defaults.bind_addr,
        };

        let stream_capacity = match u64_at(cfg, "/daemon/stream_capacity")? {
            Some(n) if (1..=65_536).contains(&n) => n as usize,
            Some(n) => bail!("daemon.stream_capacity out of bounds (1..=65536): {n}"),
            None => defaults.stream_capacity,
        };

        let audit_path = match str_at(cfg, "/audit/path")? {
            Some(s) if s.trim().is_empty() => None,
            Some(s) => Some(s),
            None => defaults.audit_path,
        };

        let audit_hash_chain =
            bool_at(cfg, "/audit/hash_chain")?.unwrap_or(defaults.audit_hash_chain);

        let dv = defaults.validator;
        let duplicate_window_secs = secs_at(
            cfg,
            "/validator/duplicate_window_secs",
            dv.duplicate_window_secs,
        )?;
        let short_stay_secs = secs_at(cfg, "/validator/short_stay_secs", dv.short_stay_secs)?;
        let excessive_entries = match u64_at(cfg, "/validator/excessive_entries")? {
            Some(n) if n >= 1 => n as usize,
            Some(n) => bail!("validator.excessive_entries must be >= 1: {n}"),
            None => dv.excessive_entries,
        };
        let unusual_start_hour =
            hour_at(cfg, "/validator/unusual_start_hour", dv.unusual_start_hour)?;
        let unusual_end_hour = hour_at(cfg, "/validator/unusual_end_hour", dv.unusual_end_hour)?;

        Ok(Self {
            bind_addr,
            stream_capacity,
            audit_path,
            audit_hash_chain,
            validator: ValidatorSettings {
                duplicate_window_secs,
                short_stay_secs,
                excessive_entries,
                unusual_start_hour,
                unusual_end_hour,
            },
        })
    }
}

fn str_at(cfg: &Value, ptr: &str) -> Result<Option<String>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => bail!("{ptr} must be a string, got: {other}"),
    }
}

fn bool_at(cfg: &Value, ptr: &str) -> Result<Option<bool>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => bail!("{ptr} must be a bool, got: {other}"),
    }
}

fn u64_at(cfg: &Value, ptr: &str) -> Result<Option<u64>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) => Ok(Some(v)),
            None => bail!("{ptr} must be a non-negative integer, got: {n}"),
        },
        Some(other) => bail!("{ptr} must be an integer, got: {other}"),
    }
}

fn secs_at(cfg: &Value, ptr: &str, default: i64) -> Result<i64> {
    match u64_at(cfg, ptr)? {
        Some(n) if n <= i64::MAX as u64 => Ok(n as i64),
        Some(n) => bail!("{ptr} out of range: {n}"),
        None => Ok(default),
    }
}

fn hour_at(cfg: &Value, ptr: &str, default: u32) -> Result<u32> {
    match u64_at(cfg, ptr)? {
        Some(n) if n < 24 => Ok(n as u32),
        Some(n) => bail!("{ptr} must be an hour 0..=23: {n}"),
        None => Ok(default),
    }
}
