//! Shared test utilities for the alarm core.
//!
//! This module provides common setup functions and recording fakes for the
//! platform capabilities used across test modules.

#![cfg(test)]

use crate::clock::Clock;
use crate::db::{migrations, Database};
use crate::models::{Difficulty, GameType};
use crate::platform::{
    AlertSurface, AudioError, AudioOutput, ChallengePresenter, PermissionProbe, Playback,
    SoundSource, TimerError, WakeLock, WakeLockProvider, WakeSlot, WakeTimerBackend,
};
use crate::ring::{RingDelivery, RingPlatform};
use crate::scheduler::{ExactAlarmScheduler, WakeScheduler};
use crate::service::AlarmService;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

/// Create a temporary test database with migrations applied.
///
/// Returns a tuple of (Database, TempDir). The TempDir must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_db() -> (Database, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).expect("Failed to open test database");
    migrations::run(db.connection()).expect("Failed to run migrations on test DB");
    (db, dir)
}

pub fn setup_shared_db() -> (Arc<Mutex<Database>>, TempDir) {
    let (db, dir) = setup_test_db();
    (Arc::new(Mutex::new(db)), dir)
}

pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self(AtomicI64::new(now_ms))
    }

    pub fn set(&self, now_ms: i64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeWakeTimers {
    pending: Mutex<HashMap<WakeSlot, i64>>,
    denied: AtomicBool,
    failing: Mutex<HashSet<i64>>,
}

impl FakeWakeTimers {
    pub fn deny(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    pub fn fail_alarm(&self, alarm_id: i64) {
        self.failing.lock().unwrap().insert(alarm_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl WakeTimerBackend for FakeWakeTimers {
    fn set_alarm_clock(&self, slot: WakeSlot, trigger_at_ms: i64) -> Result<(), TimerError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(TimerError::PermissionDenied);
        }
        if self.failing.lock().unwrap().contains(&slot.alarm_id()) {
            return Err(TimerError::Unavailable("injected".into()));
        }
        self.pending.lock().unwrap().insert(slot, trigger_at_ms);
        Ok(())
    }

    fn cancel(&self, slot: WakeSlot) -> bool {
        self.pending.lock().unwrap().remove(&slot).is_some()
    }

    fn pending(&self, slot: WakeSlot) -> Option<i64> {
        self.pending.lock().unwrap().get(&slot).copied()
    }
}

pub struct FakePermissions {
    scheduling: AtomicBool,
    notification: AtomicBool,
    overlay: AtomicBool,
}

impl FakePermissions {
    pub fn granted() -> Self {
        Self {
            scheduling: AtomicBool::new(true),
            notification: AtomicBool::new(true),
            overlay: AtomicBool::new(true),
        }
    }

    pub fn set_scheduling(&self, granted: bool) {
        self.scheduling.store(granted, Ordering::SeqCst);
    }
}

impl PermissionProbe for FakePermissions {
    fn has_scheduling_privilege(&self) -> bool {
        self.scheduling.load(Ordering::SeqCst)
    }

    fn has_notification_privilege(&self) -> bool {
        self.notification.load(Ordering::SeqCst)
    }

    fn has_overlay_privilege(&self) -> bool {
        self.overlay.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    posted: Mutex<Vec<i64>>,
    showing: AtomicBool,
}

impl RecordingAlerts {
    pub fn posted(&self) -> Vec<i64> {
        self.posted.lock().unwrap().clone()
    }

    pub fn is_showing(&self) -> bool {
        self.showing.load(Ordering::SeqCst)
    }
}

impl AlertSurface for RecordingAlerts {
    fn post_alert(&self, alarm_id: i64, _label: &str) {
        self.posted.lock().unwrap().push(alarm_id);
        self.showing.store(true, Ordering::SeqCst);
    }

    fn cancel_alert(&self) {
        self.showing.store(false, Ordering::SeqCst);
    }
}

/// Decrements a shared counter once when stopped. Deliberately not tied to
/// `Drop`, so tests see whether callers really stop what they start.
struct CountedHandle {
    active: Arc<AtomicUsize>,
    stopped: bool,
}

impl CountedHandle {
    fn start(active: &Arc<AtomicUsize>) -> Box<Self> {
        active.fetch_add(1, Ordering::SeqCst);
        Box::new(Self {
            active: Arc::clone(active),
            stopped: false,
        })
    }

    fn finish(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Playback for CountedHandle {
    fn stop(&mut self) {
        self.finish();
    }
}

impl WakeLock for CountedHandle {
    fn release(&mut self) {
        self.finish();
    }
}

#[derive(Default)]
pub struct FakeAudio {
    broken: Mutex<Vec<SoundSource>>,
    started: Mutex<Vec<SoundSource>>,
    playing: Arc<AtomicUsize>,
    vibrating: Arc<AtomicUsize>,
}

impl FakeAudio {
    pub fn break_source(&self, source: SoundSource) {
        self.broken.lock().unwrap().push(source);
    }

    pub fn started(&self) -> Vec<SoundSource> {
        self.started.lock().unwrap().clone()
    }

    pub fn playing(&self) -> usize {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn vibrating(&self) -> usize {
        self.vibrating.load(Ordering::SeqCst)
    }
}

impl AudioOutput for FakeAudio {
    fn play_looping(&self, source: &SoundSource) -> Result<Box<dyn Playback>, AudioError> {
        if self.broken.lock().unwrap().contains(source) {
            return Err(AudioError::Unavailable(format!("{source:?}")));
        }
        self.started.lock().unwrap().push(source.clone());
        Ok(CountedHandle::start(&self.playing))
    }

    fn start_vibration(&self) -> Box<dyn Playback> {
        CountedHandle::start(&self.vibrating)
    }
}

#[derive(Default)]
pub struct FakeWakeLocks {
    held: Arc<AtomicUsize>,
    acquired: AtomicUsize,
}

impl FakeWakeLocks {
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

impl WakeLockProvider for FakeWakeLocks {
    fn acquire(&self, _tag: &str, _timeout: Duration) -> Box<dyn WakeLock> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        CountedHandle::start(&self.held)
    }
}

#[derive(Default)]
pub struct RecordingChallenge {
    presented: Mutex<Vec<(i64, Option<(GameType, Difficulty)>)>>,
}

impl RecordingChallenge {
    pub fn presented(&self) -> Vec<(i64, Option<(GameType, Difficulty)>)> {
        self.presented.lock().unwrap().clone()
    }
}

impl ChallengePresenter for RecordingChallenge {
    fn present(&self, alarm_id: i64, challenge: Option<(GameType, Difficulty)>) {
        self.presented.lock().unwrap().push((alarm_id, challenge));
    }
}

/// A fully wired core over a temp database and recording fakes.
pub struct Harness {
    pub db: Arc<Mutex<Database>>,
    pub clock: Arc<ManualClock>,
    pub timers: Arc<FakeWakeTimers>,
    pub permissions: Arc<FakePermissions>,
    pub scheduler: Arc<ExactAlarmScheduler>,
    pub service: Arc<AlarmService>,
    pub alerts: Arc<RecordingAlerts>,
    pub audio: Arc<FakeAudio>,
    pub wake_locks: Arc<FakeWakeLocks>,
    pub challenge: Arc<RecordingChallenge>,
    _dir: TempDir,
}

impl Harness {
    pub fn new(now_ms: i64) -> Self {
        let (db, dir) = setup_shared_db();
        let clock = Arc::new(ManualClock::new(now_ms));
        let timers = Arc::new(FakeWakeTimers::default());
        let permissions = Arc::new(FakePermissions::granted());
        let scheduler = Arc::new(ExactAlarmScheduler::new(
            Arc::clone(&timers) as Arc<dyn WakeTimerBackend>,
            Arc::clone(&permissions) as Arc<dyn PermissionProbe>,
        ));
        let service = Arc::new(AlarmService::new(
            Arc::clone(&db),
            Arc::clone(&scheduler) as Arc<dyn WakeScheduler>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));

        Self {
            db,
            clock,
            timers,
            permissions,
            scheduler,
            service,
            alerts: Arc::new(RecordingAlerts::default()),
            audio: Arc::new(FakeAudio::default()),
            wake_locks: Arc::new(FakeWakeLocks::default()),
            challenge: Arc::new(RecordingChallenge::default()),
            _dir: dir,
        }
    }

    pub fn ring_platform(&self) -> RingPlatform {
        RingPlatform {
            alerts: Arc::clone(&self.alerts) as Arc<dyn AlertSurface>,
            audio: Arc::clone(&self.audio) as Arc<dyn AudioOutput>,
            challenge: Arc::clone(&self.challenge) as Arc<dyn ChallengePresenter>,
            wake_locks: Arc::clone(&self.wake_locks) as Arc<dyn WakeLockProvider>,
        }
    }

    pub fn ring(&self) -> RingDelivery {
        RingDelivery::new(
            Arc::clone(&self.service),
            Arc::clone(&self.db),
            self.ring_platform(),
            Arc::clone(&self.clock) as Arc<dyn Clock>,
            Duration::from_secs(10),
        )
    }
}
