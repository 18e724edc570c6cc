//! What happens between a wake timer firing and the alarm being resolved.
//!
//! ```text
//! IDLE -> WAKING -> RINGING -> RESOLVING -> RESCHEDULED | DISABLED -> IDLE
//! ```
//!
//! Only one alarm rings at a time. A wake for the ringing alarm is ignored; a
//! wake for another alarm waits in a queue until the current ring resolves.

pub mod audio;
pub mod session;

use crate::clock::Clock;
use crate::constants::{MILLIS_PER_MINUTE, WAKE_LOCK_TAG};
use crate::db::{with_connection, Database};
use crate::error::{AppError, AppResult};
use crate::models::{Alarm, AlarmHistory};
use crate::platform::{AlertSurface, AudioOutput, ChallengePresenter, WakeLockProvider};
use crate::service::AlarmService;
use crate::trigger::next_trigger_millis;
use log::{debug, error, info, warn};
use serde::Serialize;
use session::{HeldWakeLock, RingSession};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RingState {
    Idle,
    Waking,
    Ringing,
    Resolving,
    Rescheduled,
    Disabled,
}

/// OS collaborators a ring needs.
#[derive(Clone)]
pub struct RingPlatform {
    pub alerts: Arc<dyn AlertSurface>,
    pub audio: Arc<dyn AudioOutput>,
    pub challenge: Arc<dyn ChallengePresenter>,
    pub wake_locks: Arc<dyn WakeLockProvider>,
}

struct ActiveRing {
    alarm_id: i64,
    alarm: Alarm,
    /// `None` if the history row could not be written; the ring goes on regardless.
    history: Option<AlarmHistory>,
    snoozed_count: u32,
    session: RingSession,
}

struct Inner {
    state: RingState,
    active: Option<ActiveRing>,
    queued: VecDeque<i64>,
}

pub struct RingDelivery {
    service: Arc<AlarmService>,
    db: Arc<Mutex<Database>>,
    platform: RingPlatform,
    clock: Arc<dyn Clock>,
    wake_lock_timeout: Duration,
    inner: Mutex<Inner>,
}

fn transition(inner: &mut Inner, alarm_id: i64, to: RingState) {
    info!("Alarm {alarm_id}: {:?} -> {to:?}", inner.state);
    inner.state = to;
}

fn not_ringing(alarm_id: i64) -> AppError {
    AppError::InvalidState(format!("alarm {alarm_id} is not ringing"))
}

/// Stand-in used when the store cannot be read: ring loudly, dismiss plainly.
fn fallback_alarm(alarm_id: i64) -> Alarm {
    let mut alarm = Alarm::new(0, 0);
    alarm.id = Some(alarm_id);
    alarm.snooze.enabled = false;
    alarm.challenge.enabled = false;
    alarm
}

impl RingDelivery {
    pub fn new(
        service: Arc<AlarmService>,
        db: Arc<Mutex<Database>>,
        platform: RingPlatform,
        clock: Arc<dyn Clock>,
        wake_lock_timeout: Duration,
    ) -> Self {
        Self {
            service,
            db,
            platform,
            clock,
            wake_lock_timeout,
            inner: Mutex::new(Inner {
                state: RingState::Idle,
                active: None,
                queued: VecDeque::new(),
            }),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Ring state mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn state(&self) -> RingState {
        self.lock_inner().state
    }

    pub fn ringing_alarm(&self) -> Option<i64> {
        self.lock_inner().active.as_ref().map(|a| a.alarm_id)
    }

    pub fn queued(&self) -> Vec<i64> {
        self.lock_inner().queued.iter().copied().collect()
    }

    /// Entry point for a fired wake timer.
    pub fn on_wake(&self, alarm_id: i64) -> RingState {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;

        if let Some(active) = &inner.active {
            if active.alarm_id == alarm_id {
                debug!("Alarm {alarm_id} is already ringing, ignoring repeated wake");
            } else if !inner.queued.contains(&alarm_id) {
                info!(
                    "Alarm {alarm_id} fired while {} rings, queued",
                    active.alarm_id
                );
                inner.queued.push_back(alarm_id);
            }
            return inner.state;
        }

        self.start_ring(inner, alarm_id)
    }

    fn start_ring(&self, inner: &mut Inner, alarm_id: i64) -> RingState {
        transition(inner, alarm_id, RingState::Waking);
        let wake_lock = HeldWakeLock::new(
            self.platform
                .wake_locks
                .acquire(WAKE_LOCK_TAG, self.wake_lock_timeout),
        );

        let alarm = match self.service.get(alarm_id) {
            Ok(Some(alarm)) if alarm.enabled => alarm,
            Ok(_) => {
                info!("Alarm {alarm_id} was deleted or disabled, dropping wake");
                transition(inner, alarm_id, RingState::Idle);
                return RingState::Idle;
            }
            Err(e) => {
                error!("Failed to load alarm {alarm_id}, ringing with defaults: {e}");
                fallback_alarm(alarm_id)
            }
        };

        let snoozed_count = with_connection(&self.db, "load snooze streak", |conn| {
            AlarmHistory::snooze_streak(conn, alarm_id)
        })
        .unwrap_or(0);

        let now = self.clock.now_ms();
        let mut session = RingSession::start(alarm_id, &alarm, &self.platform, wake_lock);
        let history = with_connection(&self.db, "open history row", |conn| {
            let closed = AlarmHistory::close_abandoned(conn, alarm_id, now, snoozed_count)?;
            if closed > 0 {
                debug!("Closed {closed} abandoned history rows for alarm {alarm_id}");
            }
            let mut row = AlarmHistory::open(alarm_id, now);
            row.save(conn)?;
            Ok(row)
        })
        .ok();
        session.confirm_started();

        inner.active = Some(ActiveRing {
            alarm_id,
            alarm,
            history,
            snoozed_count,
            session,
        });
        transition(inner, alarm_id, RingState::Ringing);
        RingState::Ringing
    }

    fn take_active(inner: &mut Inner, alarm_id: i64) -> AppResult<ActiveRing> {
        match inner.active.take() {
            Some(active) if active.alarm_id == alarm_id => Ok(active),
            other => {
                inner.active = other;
                Err(not_ringing(alarm_id))
            }
        }
    }

    fn close_history(&self, history: Option<AlarmHistory>, now: i64, snoozed: u32, success: bool) {
        if let Some(mut row) = history {
            let _ = with_connection(&self.db, "close history row", |conn| {
                row.close(conn, now, snoozed, success)
            });
        }
    }

    /// Record the terminal state, return to idle and start the next queued ring.
    fn finish(
        &self,
        inner: &mut Inner,
        alarm_id: i64,
        result: AppResult<RingState>,
    ) -> AppResult<RingState> {
        match &result {
            Ok(state) => transition(inner, alarm_id, *state),
            Err(e) => error!("Failed to reschedule alarm {alarm_id}: {e}"),
        }
        transition(inner, alarm_id, RingState::Idle);
        while let Some(next) = inner.queued.pop_front() {
            if self.start_ring(inner, next) == RingState::Ringing {
                break;
            }
        }
        result
    }

    /// The challenge was completed: dismiss, then advance or disable the alarm.
    pub fn on_challenge_success(&self, alarm_id: i64) -> AppResult<RingState> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let ActiveRing {
            alarm,
            history,
            snoozed_count,
            session,
            ..
        } = Self::take_active(inner, alarm_id)?;

        transition(inner, alarm_id, RingState::Resolving);
        drop(session);
        let now = self.clock.now_ms();
        self.close_history(history, now, snoozed_count, true);

        let result = if alarm.is_repeating() {
            next_trigger_millis(alarm.hour, alarm.minute, alarm.repeat, now)
                .ok_or_else(|| AppError::InvalidState(format!("alarm {alarm_id} has no next occurrence")))
                .and_then(|next| self.service.update_next_trigger(alarm_id, next, now))
                .map(|_| RingState::Rescheduled)
        } else {
            self.service
                .toggle_enabled(alarm_id, false, now)
                .map(|_| RingState::Disabled)
        };
        self.finish(inner, alarm_id, result)
    }

    /// Silence the ring for the configured interval, keeping the alarm's schedule.
    pub fn on_snooze(&self, alarm_id: i64) -> AppResult<RingState> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;

        let active = inner
            .active
            .as_ref()
            .filter(|a| a.alarm_id == alarm_id)
            .ok_or_else(|| not_ringing(alarm_id))?;
        if !active.alarm.can_snooze(active.snoozed_count) {
            return Err(AppError::InvalidState(format!(
                "alarm {alarm_id} cannot be snoozed again"
            )));
        }

        let ActiveRing {
            alarm,
            history,
            snoozed_count,
            session,
            ..
        } = Self::take_active(inner, alarm_id)?;

        transition(inner, alarm_id, RingState::Resolving);
        drop(session);
        let now = self.clock.now_ms();
        let snoozed_count = snoozed_count + 1;
        self.close_history(history, now, snoozed_count, false);

        let at = now + i64::from(alarm.snooze.interval_minutes) * MILLIS_PER_MINUTE;
        info!("Alarm {alarm_id} snoozed ({snoozed_count}) until {at}");
        let result = self
            .service
            .update_next_trigger(alarm_id, at, now)
            .map(|_| RingState::Rescheduled);
        self.finish(inner, alarm_id, result)
    }

    /// The foreground session died mid-ring. The sound stops with it, the
    /// history row stays open and the alarm is re-armed from the store, so a
    /// trigger that already passed fires again straight away.
    pub fn on_session_terminated(&self, alarm_id: i64) -> AppResult<()> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;

        let Ok(active) = Self::take_active(inner, alarm_id) else {
            debug!("Session end for alarm {alarm_id}, which is not ringing");
            return Ok(());
        };
        warn!("Ring session for alarm {alarm_id} terminated, re-arming");
        drop(active);
        transition(inner, alarm_id, RingState::Idle);

        let outcome = self.service.rearm(alarm_id);
        while let Some(next) = inner.queued.pop_front() {
            if self.start_ring(inner, next) == RingState::Ringing {
                break;
            }
        }
        outcome.map(|_| ())
    }

    /// Bring the ringing alarm's challenge back after the user left it.
    pub fn reopen(&self) -> Option<i64> {
        let inner = self.lock_inner();
        let active = inner.active.as_ref()?;
        let challenge = active
            .alarm
            .challenge
            .enabled
            .then_some((active.alarm.challenge.game_type, active.alarm.challenge.difficulty));
        self.platform.challenge.present(active.alarm_id, challenge);
        Some(active.alarm_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, GameType, SoundSelector};
    use crate::platform::SoundSource;
    use crate::repeat_days::RepeatDays;
    use crate::scheduler::WakeScheduler;
    use crate::test_utils::Harness;

    // 2024-01-10 12:00:00 UTC
    const NOW: i64 = 1_704_888_000_000;

    fn one_shot(h: &Harness) -> Alarm {
        let mut alarm = Alarm::new(7, 0);
        alarm.challenge.game_type = GameType::MoleHell;
        alarm.challenge.difficulty = Difficulty::Hell;
        let (id, _) = h.service.upsert(alarm).unwrap().unwrap();
        h.service.get(id).unwrap().unwrap()
    }

    fn daily(h: &Harness) -> Alarm {
        let mut alarm = Alarm::new(6, 30);
        alarm.repeat = RepeatDays::EVERY_DAY;
        let (id, _) = h.service.upsert(alarm).unwrap().unwrap();
        h.service.get(id).unwrap().unwrap()
    }

    fn history(h: &Harness, alarm_id: i64) -> Vec<AlarmHistory> {
        let db = h.db.lock().unwrap();
        AlarmHistory::find_by_alarm(db.connection(), alarm_id, 20).unwrap()
    }

    #[test]
    fn test_wake_starts_ring() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let alarm = one_shot(&h);
        let id = alarm.id.unwrap();
        h.clock.set(alarm.next_trigger_at);

        assert_eq!(ring.on_wake(id), RingState::Ringing);
        assert_eq!(ring.state(), RingState::Ringing);
        assert_eq!(ring.ringing_alarm(), Some(id));
        assert_eq!(h.alerts.posted(), vec![id]);
        assert_eq!(h.audio.playing(), 1);
        assert_eq!(
            h.challenge.presented(),
            vec![(id, Some((GameType::MoleHell, Difficulty::Hell)))]
        );

        let rows = history(&h, id);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_open());
        assert_eq!(rows[0].fired_at, alarm.next_trigger_at);

        assert_eq!(h.wake_locks.acquired(), 1);
        assert_eq!(h.wake_locks.held(), 0);
    }

    #[test]
    fn test_repeated_wake_is_noop() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let id = one_shot(&h).id.unwrap();

        ring.on_wake(id);
        assert_eq!(ring.on_wake(id), RingState::Ringing);
        assert_eq!(h.alerts.posted().len(), 1);
        assert_eq!(h.audio.playing(), 1);
        assert_eq!(history(&h, id).len(), 1);
        assert!(ring.queued().is_empty());
    }

    #[test]
    fn test_success_disables_one_shot() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let id = one_shot(&h).id.unwrap();

        ring.on_wake(id);
        h.clock.advance(30_000);
        assert_eq!(ring.on_challenge_success(id).unwrap(), RingState::Disabled);

        assert_eq!(ring.state(), RingState::Idle);
        assert_eq!(h.audio.playing(), 0);
        assert!(!h.alerts.is_showing());
        assert!(!h.service.get(id).unwrap().unwrap().enabled);
        assert_eq!(h.scheduler.armed_at(id), None);

        let rows = history(&h, id);
        assert_eq!(rows[0].dismissed_at, Some(NOW + 30_000));
        assert!(rows[0].game_success);
        assert_eq!(rows[0].snoozed_count, 0);
    }

    #[test]
    fn test_success_advances_repeating_alarm() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let alarm = daily(&h);
        let id = alarm.id.unwrap();
        h.clock.set(alarm.next_trigger_at);

        ring.on_wake(id);
        assert_eq!(ring.on_challenge_success(id).unwrap(), RingState::Rescheduled);

        let expected =
            next_trigger_millis(6, 30, RepeatDays::EVERY_DAY, alarm.next_trigger_at).unwrap();
        assert!(expected > alarm.next_trigger_at);
        assert_eq!(h.scheduler.armed_at(id), Some(expected));
        assert_eq!(h.timers.pending_count(), 1);
        assert!(h.service.get(id).unwrap().unwrap().enabled);
    }

    #[test]
    fn test_snooze_twice_then_success() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let alarm = one_shot(&h);
        let id = alarm.id.unwrap();
        assert_eq!(alarm.snooze.interval_minutes, 5);
        assert_eq!(alarm.snooze.max_count, 3);

        h.clock.set(alarm.next_trigger_at);
        for round in 1..=2 {
            ring.on_wake(id);
            let snoozed_at = h.clock.now_ms();
            assert_eq!(ring.on_snooze(id).unwrap(), RingState::Rescheduled);
            assert_eq!(h.audio.playing(), 0);
            let resume = snoozed_at + 5 * MILLIS_PER_MINUTE;
            assert_eq!(h.scheduler.armed_at(id), Some(resume), "round {round}");
            h.clock.set(resume);
        }

        ring.on_wake(id);
        assert_eq!(ring.on_challenge_success(id).unwrap(), RingState::Disabled);

        let rows = history(&h, id);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].snoozed_count, 2);
        assert!(rows[0].game_success);
        assert_eq!(rows[1].snoozed_count, 2);
        assert!(!rows[1].game_success);
        assert_eq!(h.timers.pending_count(), 0);
    }

    #[test]
    fn test_snooze_refused_past_limit() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let mut alarm = Alarm::new(7, 0);
        alarm.snooze.max_count = 1;
        let (id, _) = h.service.upsert(alarm).unwrap().unwrap();

        ring.on_wake(id);
        ring.on_snooze(id).unwrap();
        ring.on_wake(id);
        assert!(ring.on_snooze(id).is_err());
        assert_eq!(ring.state(), RingState::Ringing);
        assert_eq!(h.audio.playing(), 1);
    }

    #[test]
    fn test_snooze_refused_when_disabled() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let mut alarm = Alarm::new(7, 0);
        alarm.snooze.enabled = false;
        let (id, _) = h.service.upsert(alarm).unwrap().unwrap();

        ring.on_wake(id);
        assert!(ring.on_snooze(id).is_err());
        assert_eq!(ring.ringing_alarm(), Some(id));
    }

    #[test]
    fn test_resolving_idle_machine_is_error() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        assert!(ring.on_challenge_success(1).is_err());
        assert!(ring.on_snooze(1).is_err());
        assert_eq!(ring.state(), RingState::Idle);
    }

    #[test]
    fn test_second_alarm_waits_for_first() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let first = one_shot(&h).id.unwrap();
        let second = daily(&h).id.unwrap();

        ring.on_wake(first);
        assert_eq!(ring.on_wake(second), RingState::Ringing);
        assert_eq!(ring.on_wake(second), RingState::Ringing);
        assert_eq!(ring.ringing_alarm(), Some(first));
        assert_eq!(ring.queued(), vec![second]);

        ring.on_challenge_success(first).unwrap();
        assert_eq!(ring.ringing_alarm(), Some(second));
        assert!(ring.queued().is_empty());
        assert_eq!(h.audio.playing(), 1);
    }

    #[test]
    fn test_session_termination_rearms_for_catch_up() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let alarm = one_shot(&h);
        let id = alarm.id.unwrap();
        h.clock.set(alarm.next_trigger_at + 1000);

        ring.on_wake(id);
        ring.on_session_terminated(id).unwrap();

        assert_eq!(ring.state(), RingState::Idle);
        assert_eq!(h.audio.playing(), 0);
        assert!(!h.alerts.is_showing());
        assert!(history(&h, id)[0].is_open());
        let armed = h.scheduler.armed_at(id).unwrap();
        assert_eq!(armed, alarm.next_trigger_at);
        assert!(armed < h.clock.now_ms());
    }

    #[test]
    fn test_abandoned_ring_keeps_snooze_streak() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let id = one_shot(&h).id.unwrap();

        ring.on_wake(id);
        ring.on_snooze(id).unwrap();
        ring.on_wake(id);
        ring.on_session_terminated(id).unwrap();
        ring.on_wake(id);
        ring.on_challenge_success(id).unwrap();

        assert_eq!(history(&h, id)[0].snoozed_count, 1);
    }

    #[test]
    fn test_next_ring_closes_abandoned_history_row() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let id = one_shot(&h).id.unwrap();

        ring.on_wake(id);
        ring.on_session_terminated(id).unwrap();
        h.clock.set(NOW + 60_000);
        ring.on_wake(id);

        let rows = history(&h, id);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().filter(|row| row.is_open()).count(), 1);
        assert!(rows[0].is_open());
        assert_eq!(rows[1].dismissed_at, Some(NOW + 60_000));
        assert!(!rows[1].game_success);
    }

    #[test]
    fn test_wake_for_deleted_alarm_is_dropped() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let id = one_shot(&h).id.unwrap();
        h.service.delete(id).unwrap();

        assert_eq!(ring.on_wake(id), RingState::Idle);
        assert!(h.alerts.posted().is_empty());
        assert_eq!(h.wake_locks.held(), 0);
    }

    #[test]
    fn test_no_playable_sound_still_rings() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        h.audio.break_source(SoundSource::DefaultAlarm);
        h.audio.break_source(SoundSource::DefaultNotification);
        let mut alarm = Alarm::new(7, 0);
        alarm.sound = SoundSelector::Ringtone(Some("tough_times".into()));
        alarm.vibrate = false;
        h.audio
            .break_source(SoundSource::Preset("alarm_tough_times".into()));
        let (id, _) = h.service.upsert(alarm).unwrap().unwrap();

        assert_eq!(ring.on_wake(id), RingState::Ringing);
        assert_eq!(h.audio.playing(), 0);
        assert_eq!(h.audio.vibrating(), 1);
        assert!(h.alerts.is_showing());
    }

    #[test]
    fn test_unreadable_store_still_rings() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        let id = one_shot(&h).id.unwrap();
        h.db
            .lock()
            .unwrap()
            .connection()
            .execute("DROP TABLE alarms", [])
            .unwrap();

        assert_eq!(ring.on_wake(id), RingState::Ringing);
        assert_eq!(h.audio.started(), vec![SoundSource::DefaultAlarm]);
        assert_eq!(h.challenge.presented(), vec![(id, None)]);
    }

    #[test]
    fn test_reopen_presents_challenge_again() {
        let h = Harness::new(NOW);
        let ring = h.ring();
        assert_eq!(ring.reopen(), None);

        let id = one_shot(&h).id.unwrap();
        ring.on_wake(id);
        assert_eq!(ring.reopen(), Some(id));
        assert_eq!(h.challenge.presented().len(), 2);
        assert_eq!(ring.state(), RingState::Ringing);
    }
}
