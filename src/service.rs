//! Coordinator over the alarm store and the wake scheduler.
//!
//! Every mutation writes the row and updates the wake timer while holding the
//! database lock, so no caller can observe one without the other.

use crate::clock::Clock;
use crate::db::{lock_db, Database};
use crate::error::{AppError, AppResult};
use crate::models::Alarm;
use crate::scheduler::{ArmOutcome, RearmReport, WakeScheduler};
use crate::trigger::next_trigger_millis;
use crate::validation::validate_alarm;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AlarmService {
    db: Arc<Mutex<Database>>,
    scheduler: Arc<dyn WakeScheduler>,
    clock: Arc<dyn Clock>,
    subscribers: Mutex<Vec<Sender<Vec<Alarm>>>>,
    scheduling_blocked: AtomicBool,
}

fn trigger_for(alarm: &Alarm, now: i64) -> AppResult<i64> {
    next_trigger_millis(alarm.hour, alarm.minute, alarm.repeat, now).ok_or_else(|| {
        AppError::InvalidInput {
            field: "time",
            reason: format!("{:02}:{:02} has no next occurrence", alarm.hour, alarm.minute),
        }
    })
}

impl AlarmService {
    pub fn new(
        db: Arc<Mutex<Database>>,
        scheduler: Arc<dyn WakeScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            scheduler,
            clock,
            subscribers: Mutex::new(Vec::new()),
            scheduling_blocked: AtomicBool::new(false),
        }
    }

    fn lock(&self, operation: &str) -> MutexGuard<'_, Database> {
        lock_db(&self.db, operation)
    }

    /// Bring the wake timer in line with the row just written.
    fn sync_timer(&self, alarm: &Alarm) -> ArmOutcome {
        let Some(id) = alarm.id else {
            return ArmOutcome::Skipped;
        };
        if !alarm.enabled {
            self.scheduler.disarm(id);
            return ArmOutcome::Skipped;
        }
        let outcome = self.scheduler.arm(alarm);
        self.note_outcome(outcome);
        outcome
    }

    fn note_outcome(&self, outcome: ArmOutcome) {
        match outcome {
            ArmOutcome::Armed { .. } => self.scheduling_blocked.store(false, Ordering::SeqCst),
            ArmOutcome::PermissionDenied => self.scheduling_blocked.store(true, Ordering::SeqCst),
            ArmOutcome::Skipped | ArmOutcome::Failed => {}
        }
    }

    /// Whether the last arm attempt was refused for lack of the exact-alarm privilege.
    pub fn scheduling_blocked(&self) -> bool {
        self.scheduling_blocked.load(Ordering::SeqCst)
    }

    /// All alarms, enabled first, then by next trigger time.
    pub fn list(&self) -> AppResult<Vec<Alarm>> {
        let db = self.lock("list alarms");
        Ok(Alarm::find_all(db.connection())?)
    }

    pub fn get(&self, id: i64) -> AppResult<Option<Alarm>> {
        let db = self.lock("get alarm");
        Ok(Alarm::find_by_id(db.connection(), id)?)
    }

    pub fn enabled_alarms(&self) -> AppResult<Vec<Alarm>> {
        let db = self.lock("list enabled alarms");
        Ok(Alarm::find_enabled(db.connection())?)
    }

    /// Receive the full ordered list now and after every successful mutation.
    pub fn subscribe(&self) -> AppResult<Receiver<Vec<Alarm>>> {
        let (tx, rx) = channel();
        let current = self.list()?;
        // The receiver is still held here, so this send cannot fail.
        let _ = tx.send(current);
        self.lock_subscribers().push(tx);
        Ok(rx)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Sender<Vec<Alarm>>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Subscriber list mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self) {
        let alarms = match self.list() {
            Ok(alarms) => alarms,
            Err(e) => {
                error!("Failed to load alarms for subscribers: {e}");
                return;
            }
        };
        self.lock_subscribers()
            .retain(|tx| tx.send(alarms.clone()).is_ok());
    }

    /// Insert or fully replace an alarm, recompute its trigger and re-arm it.
    ///
    /// Returns the alarm's id together with the scheduling outcome, or `None`
    /// when an update targets a row that no longer exists.
    pub fn upsert(&self, alarm: Alarm) -> AppResult<Option<(i64, ArmOutcome)>> {
        validate_alarm(&alarm)?;
        let now = self.clock.now_ms();
        let mut alarm = alarm;
        alarm.next_trigger_at = trigger_for(&alarm, now)?;

        let result = {
            let db = self.lock("upsert alarm");
            let conn = db.connection();
            let id = match alarm.id {
                None => {
                    alarm.save(conn, now)?;
                    alarm.id
                }
                Some(id) => {
                    if alarm.update(conn, now)? {
                        Some(id)
                    } else {
                        debug!("Alarm {id} vanished before update, ignoring");
                        None
                    }
                }
            };
            id.map(|id| (id, self.sync_timer(&alarm)))
        };

        if let Some((id, outcome)) = result {
            info!("Saved alarm {id} ({outcome:?})");
            self.publish();
        }
        Ok(result)
    }

    /// Delete an alarm and cancel its wake timer. Returns `false` if absent.
    pub fn delete(&self, id: i64) -> AppResult<bool> {
        let deleted = {
            let db = self.lock("delete alarm");
            let conn = db.connection();
            if Alarm::find_by_id(conn, id)?.is_none() {
                debug!("Alarm {id} already gone");
                return Ok(false);
            }
            let deleted = Alarm::delete(conn, id)?;
            self.scheduler.disarm(id);
            deleted
        };

        info!("Deleted alarm {id}");
        self.publish();
        Ok(deleted)
    }

    /// Persist the enabled flag and arm or disarm to match.
    ///
    /// Enabling recomputes the trigger from `at`, since the stored one went
    /// stale while the alarm was off. An alarm that is already enabled keeps
    /// its trigger, so a pending snooze survives.
    pub fn toggle_enabled(&self, id: i64, enabled: bool, at: i64) -> AppResult<bool> {
        {
            let db = self.lock("toggle alarm");
            let conn = db.connection();
            let Some(mut alarm) = Alarm::find_by_id(conn, id)? else {
                debug!("Alarm {id} not found, toggle ignored");
                return Ok(false);
            };

            if enabled && alarm.enabled {
                if !Alarm::set_enabled(conn, id, true, at)? {
                    return Ok(false);
                }
            } else if enabled {
                let next = trigger_for(&alarm, at)?;
                if !Alarm::reenable(conn, id, next, at)? {
                    return Ok(false);
                }
                alarm.next_trigger_at = next;
            } else if !Alarm::set_enabled(conn, id, false, at)? {
                return Ok(false);
            }
            alarm.enabled = enabled;
            alarm.updated_at = at;
            self.sync_timer(&alarm);
        }

        info!("Alarm {id} {}", if enabled { "enabled" } else { "disabled" });
        self.publish();
        Ok(true)
    }

    /// Move an alarm's next fire time and re-arm it (after a ring or a snooze).
    pub fn update_next_trigger(&self, id: i64, at: i64, updated_at: i64) -> AppResult<bool> {
        {
            let db = self.lock("update next trigger");
            let conn = db.connection();
            let Some(mut alarm) = Alarm::find_by_id(conn, id)? else {
                debug!("Alarm {id} not found, trigger update ignored");
                return Ok(false);
            };
            if !Alarm::set_next_trigger(conn, id, at, updated_at)? {
                return Ok(false);
            }
            alarm.next_trigger_at = at;
            alarm.updated_at = updated_at;
            self.sync_timer(&alarm);
        }

        debug!("Alarm {id} next trigger moved to {at}");
        self.publish();
        Ok(true)
    }

    /// Re-arm one alarm from its stored state.
    pub fn rearm(&self, id: i64) -> AppResult<Option<ArmOutcome>> {
        let db = self.lock("re-arm alarm");
        let Some(alarm) = Alarm::find_by_id(db.connection(), id)? else {
            return Ok(None);
        };
        Ok(Some(self.sync_timer(&alarm)))
    }

    /// Re-arm every enabled alarm, e.g. after the exact-alarm privilege is granted.
    pub fn rearm_enabled(&self) -> AppResult<RearmReport> {
        let db = self.lock("re-arm enabled alarms");
        let alarms = Alarm::find_enabled(db.connection())?;
        let report = self.scheduler.rearm_all(&alarms);
        if report.armed > 0 {
            self.scheduling_blocked.store(false, Ordering::SeqCst);
        }
        if !report.denied.is_empty() {
            self.scheduling_blocked.store(true, Ordering::SeqCst);
        }
        Ok(report)
    }
}
