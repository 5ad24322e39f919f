//! Anomaly validator for attendance events.
//!
//! Pure logic: given the event about to be written and the person's existing
//! same-day records, produce an ordered list of [`ValidationIssue`]s. The
//! validator performs no IO and cannot fail, so a scan is never blocked by
//! validation. Only `error`-severity issues make the resulting record
//! unreconciled; `warning` and `info` are advisory data for the
//! reconciliation queue.

use chrono::{DateTime, Datelike, Utc};
use ddk_schemas::local::local_hour;
use ddk_schemas::{
    AttendanceRecord, Direction, FacilityPolicy, IssueKind, Severity, ValidationIssue,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// ValidatorConfig
// ---------------------------------------------------------------------------

/// Thresholds for the anomaly checks. All checks stay enabled; tuning happens
/// through these windows only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Same-direction repeat inside this window is a duplicate (warning).
    pub duplicate_window_secs: i64,
    /// An IN→OUT pair closer than this is a short stay (warning).
    pub short_stay_secs: i64,
    /// This many existing records in one day is excessive (warning).
    pub excessive_entries: usize,
    /// Facility-local hour span `[start, end)` flagged as unusual (info).
    /// Wraps midnight when `start > end`.
    pub unusual_start_hour: u32,
    pub unusual_end_hour: u32,
}

impl Default for ValidatorConfig {
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

impl ValidatorConfig {
    fn unusual_hour(&self, hour: u32) -> bool {
        if self.unusual_start_hour <= self.unusual_end_hour {
            (self.unusual_start_hour..self.unusual_end_hour).contains(&hour)
        } else {
            hour >= self.unusual_start_hour || hour < self.unusual_end_hour
        }
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

/// Inspect one incoming event against that person's existing same-day records.
///
/// `prior` must be the non-deleted records of the same facility-local day,
/// sorted ascending by timestamp. The returned issues keep a stable order:
/// sequence checks first (duplicate / short stay / missing counterpart), then
/// volume, then time-of-day advisories.
///
/// Direction-sequence rules against the last record:
/// - same direction within the duplicate window → `Duplicate` (warning);
/// - same direction outside the window → `MissingOut` / `MissingIn` (error);
/// - IN followed by a fast OUT → `ShortStay` (warning).
pub fn validate(
    cfg: &ValidatorConfig,
    policy: &FacilityPolicy,
    direction: Direction,
    ts_utc: DateTime<Utc>,
    prior: &[AttendanceRecord],
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if let Some(last) = prior.last() {
        let elapsed = (ts_utc - last.ts_utc).num_seconds();

        if last.direction == direction {
            if elapsed.abs() < cfg.duplicate_window_secs {
                issues.push(ValidationIssue {
                    kind: IssueKind::Duplicate,
                    severity: Severity::Warning,
                    message: format!(
                        "same direction {} as previous scan {}s earlier",
                        direction.as_str(),
                        elapsed.abs()
                    ),
                    data: json!({ "elapsed_secs": elapsed }),
                });
            } else {
                // A repeated direction beyond the duplicate window means the
                // counterpart scan never arrived.
                let (kind, missing) = match direction {
                    Direction::In => (IssueKind::MissingOut, "OUT"),
                    Direction::Out => (IssueKind::MissingIn, "IN"),
                };
                issues.push(ValidationIssue {
                    kind,
                    severity: Severity::Error,
                    message: format!(
                        "{} follows {} with no {} between",
                        direction.as_str(),
                        last.direction.as_str(),
                        missing
                    ),
                    data: json!({
                        "elapsed_secs": elapsed,
                        "previous_record_id": last.record_id,
                    }),
                });
            }
        } else if last.direction == Direction::In
            && direction == Direction::Out
            && elapsed >= 0
            && elapsed < cfg.short_stay_secs
        {
            issues.push(ValidationIssue {
                kind: IssueKind::ShortStay,
                severity: Severity::Warning,
                message: format!(
                    "OUT only {}s after IN (threshold {}s)",
                    elapsed, cfg.short_stay_secs
                ),
                data: json!({ "elapsed_secs": elapsed }),
            });
        }
    }

    if prior.len() >= cfg.excessive_entries {
        issues.push(ValidationIssue {
            kind: IssueKind::ExcessiveEntries,
            severity: Severity::Warning,
            message: format!("{} records already logged today", prior.len()),
            data: json!({ "existing_records": prior.len() }),
        });
    }

    let hour = local_hour(ts_utc, policy.tz);
    if cfg.unusual_hour(hour) {
        issues.push(ValidationIssue {
            kind: IssueKind::UnusualTime,
            severity: Severity::Info,
            message: format!("scan at {:02}:00 hour, facility-local", hour),
            data: json!({ "local_hour": hour }),
        });
    }

    if let Some(rest) = policy.rest_weekday {
        let weekday = ts_utc.with_timezone(&policy.tz).weekday();
        if weekday == rest {
            issues.push(ValidationIssue {
                kind: IssueKind::RestDay,
                severity: Severity::Info,
                message: format!("scan on weekly rest day ({})", weekday),
                data: json!({ "weekday": weekday.to_string() }),
            });
        }
    }

    issues
}

/// `reconciled` verdict for a fresh record: true unless any issue is an error.
pub fn auto_reconciled(issues: &[ValidationIssue]) -> bool {
    !issues.iter().any(|i| i.severity == Severity::Error)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
