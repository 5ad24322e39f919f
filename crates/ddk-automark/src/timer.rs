use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use ddk_schemas::local::{local_day, local_time_utc};
use ddk_store::Store;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::engine::{AutoMarkEngine, AutoMarkError};

/// Re-check interval while a facility's timer exists but auto-mark is off.
const DISABLED_POLL: Duration = Duration::from_secs(300);
/// Backoff after a failed policy read.
const RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Next facility-local fire instant strictly after `now`. A fire time that
/// already passed today rolls to tomorrow; DST gaps and folds resolve to the
/// earliest valid instant.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let today = local_day(now, tz);
    let candidate = local_time_utc(today, at, tz);
    if candidate > now {
        return candidate;
    }
    let tomorrow = today.succ_opt().unwrap_or(today);
    local_time_utc(tomorrow, at, tz)
}

/// Owns one scheduling task per facility. Stop aborts the task; restart
/// resumes from the next tick and never replays missed ones.
pub struct TimerSupervisor {
    engine: Arc<AutoMarkEngine>,
    store: Arc<dyn Store>,
    tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl TimerSupervisor {
    pub fn new(engine: Arc<AutoMarkEngine>, store: Arc<dyn Store>) -> Self {
        Self {
            engine,
            store,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts timers for every facility whose policy has auto-mark on.
    /// Returns the facilities actually started.
    pub async fn start_enabled(&self) -> Result<Vec<Uuid>, AutoMarkError> {
        let mut started = Vec::new();
        for facility_id in self.store.facilities().await? {
            let policy = self.store.policy(facility_id).await?;
            if !policy.auto_mark {
                tracing::info!(facility = %facility_id, "auto-mark disabled; timer not started");
                continue;
            }
            if self.start(facility_id) {
                started.push(facility_id);
            }
        }
        Ok(started)
    }

    /// Spawns the facility's timer task. Returns false when one is already
    /// running.
    pub fn start(&self, facility_id: Uuid) -> bool {
        let mut tasks = self.lock();
        if let Some(handle) = tasks.get(&facility_id) {
            if !handle.is_finished() {
                return false;
            }
        }
        let engine = self.engine.clone();
        let store = self.store.clone();
        tasks.insert(facility_id, tokio::spawn(run_loop(engine, store, facility_id)));
        tracing::info!(facility = %facility_id, "auto-mark timer started");
        true
    }

    /// Aborts the facility's timer task. Returns false when none was running.
    pub fn stop(&self, facility_id: Uuid) -> bool {
        let mut tasks = self.lock();
        match tasks.remove(&facility_id) {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                tracing::info!(facility = %facility_id, "auto-mark timer stopped");
                was_running
            }
            None => false,
        }
    }

    /// Facilities with a live timer task, sorted.
    pub fn running(&self) -> Vec<Uuid> {
        let mut tasks = self.lock();
        tasks.retain(|_, handle| !handle.is_finished());
        let mut ids: Vec<Uuid> = tasks.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn stop_all(&self) {
        let mut tasks = self.lock();
        for (facility_id, handle) in tasks.drain() {
            handle.abort();
            tracing::info!(facility = %facility_id, "auto-mark timer stopped");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for TimerSupervisor {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Sleep-until-fire loop for one facility. Policy is re-read on every cycle
/// (and again after the sleep), so time, timezone and enable-flag changes
/// take effect without a restart.
async fn run_loop(engine: Arc<AutoMarkEngine>, store: Arc<dyn Store>, facility_id: Uuid) {
    loop {
        let policy = match store.policy(facility_id).await {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(facility = %facility_id, %err, "policy read failed; retrying");
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
        };
        if !policy.auto_mark {
            tokio::time::sleep(DISABLED_POLL).await;
            continue;
        }

        let now = Utc::now();
        let fire = next_run_after(now, policy.auto_mark_time, policy.tz);
        let wait = (fire - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(facility = %facility_id, %fire, "auto-mark timer armed");
        tokio::time::sleep(wait).await;

        match store.policy(facility_id).await {
            Ok(p) if p.auto_mark => {
                let day = local_day(Utc::now(), p.tz);
                if let Err(err) = engine.mark_for_date(facility_id, day).await {
                    tracing::warn!(facility = %facility_id, %day, %err, "scheduled auto-mark failed");
                }
            }
            Ok(_) => {
                tracing::info!(facility = %facility_id, "auto-mark disabled while armed; tick skipped")
            }
            Err(err) => {
                tracing::warn!(facility = %facility_id, %err, "policy read failed at tick")
            }
        }
    }
}
