//! Projection of each enabled alarm's `next_trigger_at` onto one OS wake
//! timer. The gateway keeps no state of its own; the backend's slot table is
//! the only record of what is armed.

use crate::models::Alarm;
use crate::platform::{PermissionProbe, TimerError, WakeSlot, WakeTimerBackend};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Result of one arm attempt. Arming never fails loudly; callers inspect this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArmOutcome {
    #[serde(rename_all = "camelCase")]
    Armed { trigger_at: i64 },
    /// Nothing to arm: unsaved alarm or no trigger time yet.
    Skipped,
    /// The exact-alarm privilege is missing; the user has to grant it.
    PermissionDenied,
    Failed,
}

impl ArmOutcome {
    pub fn is_armed(self) -> bool {
        matches!(self, Self::Armed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RearmReport {
    pub armed: usize,
    pub skipped: usize,
    pub denied: Vec<i64>,
    pub failed: Vec<i64>,
}

impl RearmReport {
    pub fn record(&mut self, alarm_id: Option<i64>, outcome: ArmOutcome) {
        match (outcome, alarm_id) {
            (ArmOutcome::Armed { .. }, _) => self.armed += 1,
            (ArmOutcome::Skipped, _) | (ArmOutcome::PermissionDenied | ArmOutcome::Failed, None) => {
                self.skipped += 1;
            }
            (ArmOutcome::PermissionDenied, Some(id)) => self.denied.push(id),
            (ArmOutcome::Failed, Some(id)) => self.failed.push(id),
        }
    }
}

pub trait WakeScheduler: Send + Sync {
    /// Register the single wake timer for this alarm, replacing any earlier one.
    fn arm(&self, alarm: &Alarm) -> ArmOutcome;

    /// Cancel the alarm's wake timer; no-op when none is pending.
    fn disarm(&self, alarm_id: i64);

    /// Trigger time currently armed for the alarm, if any.
    fn armed_at(&self, alarm_id: i64) -> Option<i64>;

    /// Arm every alarm, including ones whose trigger already passed (they
    /// fire as soon as possible). One failure does not stop the batch.
    fn rearm_all(&self, alarms: &[Alarm]) -> RearmReport {
        let mut report = RearmReport::default();
        for alarm in alarms {
            let outcome = self.arm(alarm);
            if !outcome.is_armed() {
                warn!("Re-arm of alarm {:?} ended with {outcome:?}", alarm.id);
            }
            report.record(alarm.id, outcome);
        }
        info!(
            "Re-armed {} of {} alarms ({} denied, {} failed)",
            report.armed,
            alarms.len(),
            report.denied.len(),
            report.failed.len()
        );
        report
    }
}

/// Gateway onto the OS "alarm clock" timer class.
pub struct ExactAlarmScheduler {
    timers: Arc<dyn WakeTimerBackend>,
    permissions: Arc<dyn PermissionProbe>,
}

impl ExactAlarmScheduler {
    pub fn new(timers: Arc<dyn WakeTimerBackend>, permissions: Arc<dyn PermissionProbe>) -> Self {
        Self { timers, permissions }
    }
}

impl WakeScheduler for ExactAlarmScheduler {
    fn arm(&self, alarm: &Alarm) -> ArmOutcome {
        let Some(id) = alarm.id else {
            debug!("Not arming unsaved alarm");
            return ArmOutcome::Skipped;
        };
        if alarm.next_trigger_at <= 0 {
            debug!("Alarm {id} has no trigger time, not arming");
            return ArmOutcome::Skipped;
        }
        if !self.permissions.has_scheduling_privilege() {
            warn!("Cannot arm alarm {id}: exact alarm privilege missing");
            return ArmOutcome::PermissionDenied;
        }

        match self
            .timers
            .set_alarm_clock(WakeSlot::for_alarm(id), alarm.next_trigger_at)
        {
            Ok(()) => {
                debug!("Armed alarm {id} for {}", alarm.next_trigger_at);
                ArmOutcome::Armed {
                    trigger_at: alarm.next_trigger_at,
                }
            }
            Err(TimerError::PermissionDenied) => {
                warn!("OS refused exact alarm for {id}");
                ArmOutcome::PermissionDenied
            }
            Err(e @ TimerError::Unavailable(_)) => {
                error!("Failed to arm alarm {id}: {e}");
                ArmOutcome::Failed
            }
        }
    }

    fn disarm(&self, alarm_id: i64) {
        if self.timers.cancel(WakeSlot::for_alarm(alarm_id)) {
            debug!("Disarmed alarm {alarm_id}");
        }
    }

    fn armed_at(&self, alarm_id: i64) -> Option<i64> {
        self.timers.pending(WakeSlot::for_alarm(alarm_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakePermissions, FakeWakeTimers};

    fn scheduler() -> (ExactAlarmScheduler, Arc<FakeWakeTimers>, Arc<FakePermissions>) {
        let timers = Arc::new(FakeWakeTimers::default());
        let permissions = Arc::new(FakePermissions::granted());
        let scheduler = ExactAlarmScheduler::new(
            Arc::clone(&timers) as Arc<dyn WakeTimerBackend>,
            Arc::clone(&permissions) as Arc<dyn PermissionProbe>,
        );
        (scheduler, timers, permissions)
    }

    fn saved(id: i64, next_trigger_at: i64) -> Alarm {
        let mut alarm = Alarm::new(7, 0);
        alarm.id = Some(id);
        alarm.next_trigger_at = next_trigger_at;
        alarm
    }

    #[test]
    fn test_arm_registers_trigger() {
        let (scheduler, timers, _) = scheduler();
        let outcome = scheduler.arm(&saved(1, 5000));
        assert_eq!(outcome, ArmOutcome::Armed { trigger_at: 5000 });
        assert_eq!(scheduler.armed_at(1), Some(5000));
        assert_eq!(timers.pending_count(), 1);
    }

    #[test]
    fn test_arm_twice_leaves_one_timer_later_wins() {
        let (scheduler, timers, _) = scheduler();
        scheduler.arm(&saved(1, 5000));
        scheduler.arm(&saved(1, 9000));
        assert_eq!(timers.pending_count(), 1);
        assert_eq!(scheduler.armed_at(1), Some(9000));
    }

    #[test]
    fn test_arm_without_trigger_is_noop() {
        let (scheduler, timers, _) = scheduler();
        assert_eq!(scheduler.arm(&saved(1, 0)), ArmOutcome::Skipped);
        assert_eq!(scheduler.arm(&Alarm::new(7, 0)), ArmOutcome::Skipped);
        assert_eq!(timers.pending_count(), 0);
    }

    #[test]
    fn test_arm_without_privilege_reports_denied() {
        let (scheduler, timers, permissions) = scheduler();
        permissions.set_scheduling(false);
        assert_eq!(scheduler.arm(&saved(1, 5000)), ArmOutcome::PermissionDenied);
        assert_eq!(timers.pending_count(), 0);
    }

    #[test]
    fn test_backend_denial_and_failure_are_outcomes() {
        let (scheduler, timers, _) = scheduler();
        timers.deny(true);
        assert_eq!(scheduler.arm(&saved(1, 5000)), ArmOutcome::PermissionDenied);
        timers.deny(false);
        timers.fail_alarm(2);
        assert_eq!(scheduler.arm(&saved(2, 5000)), ArmOutcome::Failed);
    }

    #[test]
    fn test_disarm_missing_is_noop() {
        let (scheduler, timers, _) = scheduler();
        scheduler.disarm(42);
        scheduler.arm(&saved(1, 5000));
        scheduler.disarm(1);
        scheduler.disarm(1);
        assert_eq!(timers.pending_count(), 0);
    }

    #[test]
    fn test_rearm_all_handles_empty_and_failures() {
        let (scheduler, timers, _) = scheduler();
        assert_eq!(scheduler.rearm_all(&[]), RearmReport::default());

        timers.fail_alarm(2);
        let report = scheduler.rearm_all(&[saved(1, 100), saved(2, 200), saved(3, 300)]);
        assert_eq!(report.armed, 2);
        assert_eq!(report.failed, vec![2]);
        assert_eq!(scheduler.armed_at(1), Some(100));
        assert_eq!(scheduler.armed_at(3), Some(300));
    }

    #[test]
    fn test_rearm_all_keeps_past_triggers() {
        let (scheduler, _, _) = scheduler();
        let report = scheduler.rearm_all(&[saved(1, 1)]);
        assert_eq!(report.armed, 1);
        assert_eq!(scheduler.armed_at(1), Some(1));
    }
}
