//! Scope-bound resources of one ring. Whatever way the session ends, dropping
//! it stops the sound, takes the alert down and lets go of the wake lock.

use crate::models::Alarm;
use crate::platform::{AlertSurface, WakeLock};
use crate::ring::audio::{start_playback, ActivePlayback};
use crate::ring::RingPlatform;
use log::debug;
use std::sync::Arc;

pub struct HeldWakeLock(Option<Box<dyn WakeLock>>);

impl HeldWakeLock {
    pub fn new(lock: Box<dyn WakeLock>) -> Self {
        Self(Some(lock))
    }

    pub fn is_held(&self) -> bool {
        self.0.is_some()
    }

    pub fn release(&mut self) {
        if let Some(mut lock) = self.0.take() {
            lock.release();
        }
    }
}

impl Drop for HeldWakeLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// The foreground part of a ring: alert, looping audio and challenge screen.
pub struct RingSession {
    alarm_id: i64,
    alerts: Arc<dyn AlertSurface>,
    playback: ActivePlayback,
    wake_lock: HeldWakeLock,
}

impl RingSession {
    pub fn start(
        alarm_id: i64,
        alarm: &Alarm,
        platform: &RingPlatform,
        wake_lock: HeldWakeLock,
    ) -> Self {
        platform.alerts.post_alert(alarm_id, &alarm.label);
        let playback = start_playback(platform.audio.as_ref(), &alarm.sound, alarm.vibrate);
        let challenge = alarm
            .challenge
            .enabled
            .then_some((alarm.challenge.game_type, alarm.challenge.difficulty));
        platform.challenge.present(alarm_id, challenge);

        Self {
            alarm_id,
            alerts: Arc::clone(&platform.alerts),
            playback,
            wake_lock,
        }
    }

    /// The session is up; the CPU no longer needs to be held awake for it.
    pub fn confirm_started(&mut self) {
        self.wake_lock.release();
    }

    pub fn holds_wake_lock(&self) -> bool {
        self.wake_lock.is_held()
    }

    pub fn playback(&self) -> &ActivePlayback {
        &self.playback
    }
}

impl Drop for RingSession {
    fn drop(&mut self) {
        self.playback.stop();
        self.alerts.cancel_alert();
        debug!("Ring session for alarm {} torn down", self.alarm_id);
    }
}
