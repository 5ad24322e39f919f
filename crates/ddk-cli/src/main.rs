use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ddk_audit::{AuditSink, JsonlAuditSink, NullAuditSink, VerifyResult};
use ddk_automark::AutoMarkEngine;
use ddk_leave::LeaveEngine;
use ddk_reconcile::ReconcileEngine;
use ddk_schemas::Actor;
use ddk_store::Store;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ddk")]
#[command(about = "DormDesk attendance engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Run the end-of-day auto-mark sweep for one facility
    Automark {
        /// Facility id
        #[arg(long)]
        facility: String,

        /// Facility-local date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Widen to the inclusive range [date, to]
        #[arg(long)]
        to: Option<String>,
    },

    /// State-vs-ledger consistency commands
    Consistency {
        #[command(subcommand)]
        cmd: ConsistencyCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> operator override)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply embedded SQL migrations (idempotent).
    Migrate,
}

#[derive(Subcommand)]
enum ConsistencyCmd {
    /// Report every cached state that disagrees with the ledger. Read-only.
    Check {
        /// Facility id
        #[arg(long)]
        facility: String,
    },

    /// Force every active person's cached state back to IN.
    /// Guardrail: refuses without --yes.
    Reset {
        /// Facility id
        #[arg(long)]
        facility: String,

        /// Acknowledge the bulk overwrite of cached states.
        #[arg(long, default_value_t = false)]
        yes: bool,

        /// Attribution written to the audit log.
        #[arg(long, default_value = "cli")]
        actor: String,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a JSONL audit log.
    Verify {
        /// Path to the audit log file
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = ddk_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = ddk_db::status(&pool).await?;
                    println!("db_ok={} has_people_table={}", s.ok, s.has_people_table);
                }
                DbCmd::Migrate => {
                    ddk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Automark { facility, date, to } => {
            let facility_id = parse_uuid(&facility, "facility")?;
            let from = parse_date(&date, "date")?;
            let to = match to {
                Some(raw) => parse_date(&raw, "to")?,
                None => from,
            };

            let store = pg_store().await?;
            let audit = audit_sink()?;
            let leave = Arc::new(LeaveEngine::new(store.clone(), audit.clone()));
            let engine = AutoMarkEngine::new(store, leave, audit);

            for s in engine.mark_for_range(facility_id, from, to).await? {
                println!(
                    "day={} total={} already_marked={} marked_present={} marked_absent={} marked_on_leave={} errors={}",
                    s.day,
                    s.total,
                    s.already_marked,
                    s.marked_present,
                    s.marked_absent,
                    s.marked_on_leave,
                    s.errors
                );
            }
        }

        Commands::Consistency { cmd } => match cmd {
            ConsistencyCmd::Check { facility } => {
                let facility_id = parse_uuid(&facility, "facility")?;
                let store = pg_store().await?;
                // Read-only; nothing to audit.
                let engine = ReconcileEngine::new(store, Arc::new(NullAuditSink));

                let drifted = engine.check_state_consistency(facility_id).await?;
                println!("facility={} drifted={}", facility_id, drifted.len());
                for d in drifted {
                    println!(
                        "person={} name={:?} cached={} ledger={} ledger_ts={}",
                        d.person_id,
                        d.display_name,
                        d.current_state.as_str(),
                        d.last_ledger_direction.as_str(),
                        d.last_ledger_ts.to_rfc3339()
                    );
                }
            }

            ConsistencyCmd::Reset {
                facility,
                yes,
                actor,
            } => {
                // Guardrail before any connection is made.
                if !yes {
                    anyhow::bail!(
                        "REFUSING RESET: this forces every active person's state to IN. \
                         Re-run with: `ddk consistency reset --facility {} --yes`",
                        facility
                    );
                }
                let facility_id = parse_uuid(&facility, "facility")?;

                let store = pg_store().await?;
                let engine = ReconcileEngine::new(store, audit_sink()?);

                let touched = engine
                    .reset_all_states(facility_id, &Actor::operator(actor))
                    .await?;
                println!("reset=true facility={} touched={}", facility_id, touched);
            }
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = ddk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match ddk_audit::verify_hash_chain(&path)? {
                VerifyResult::Valid { lines } => {
                    println!("verified=true lines={}", lines);
                }
                VerifyResult::Broken { line, reason } => {
                    println!("verified=false line={} reason={}", line, reason);
                    std::process::exit(1);
                }
            },
        },
    }

    Ok(())
}

/// Logs go to stderr; stdout stays key=value parseable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn pg_store() -> Result<Arc<dyn Store>> {
    let pool = ddk_db::connect_from_env().await?;
    Ok(Arc::new(ddk_db::PgStore::new(pool)))
}

/// `DDK_AUDIT_PATH` overrides the daemon's default log location so CLI
/// actions land in the same chain the daemon writes.
fn audit_sink() -> Result<Arc<dyn AuditSink>> {
    let path = std::env::var("DDK_AUDIT_PATH")
        .unwrap_or_else(|_| ddk_config::DEFAULT_AUDIT_PATH.to_string());
    Ok(Arc::new(JsonlAuditSink::new(&path, true)?))
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid {what} uuid: {raw}"))
}

fn parse_date(raw: &str, what: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid {what} (expected YYYY-MM-DD): {raw}"))
}
