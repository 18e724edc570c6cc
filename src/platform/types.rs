use crate::models::{Difficulty, GameType};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// OS-level identity of a wake timer, derived from the alarm id alone so
/// that re-registering the same alarm replaces the earlier timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WakeSlot(i64);

impl WakeSlot {
    pub fn for_alarm(alarm_id: i64) -> Self {
        Self(alarm_id)
    }

    pub fn alarm_id(self) -> i64 {
        self.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("exact alarm privilege denied")]
    PermissionDenied,

    #[error("wake timer facility unavailable: {0}")]
    Unavailable(String),
}

/// The OS "alarm clock" class of timer: exact, wake-capable, one-shot.
pub trait WakeTimerBackend: Send + Sync {
    /// Register or replace the single pending timer for `slot`.
    fn set_alarm_clock(&self, slot: WakeSlot, trigger_at_ms: i64) -> Result<(), TimerError>;

    /// Cancel the pending timer for `slot`. Returns whether one existed.
    fn cancel(&self, slot: WakeSlot) -> bool;

    fn pending(&self, slot: WakeSlot) -> Option<i64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Scheduling,
    Notification,
    Overlay,
}

pub trait PermissionProbe: Send + Sync {
    fn has_scheduling_privilege(&self) -> bool;
    fn has_notification_privilege(&self) -> bool;
    fn has_overlay_privilege(&self) -> bool;
}

/// Privileges the user still has to grant before alarms can be relied on.
pub fn missing_permissions(probe: &dyn PermissionProbe) -> Vec<Permission> {
    let mut missing = Vec::new();
    if !probe.has_scheduling_privilege() {
        missing.push(Permission::Scheduling);
    }
    if !probe.has_notification_privilege() {
        missing.push(Permission::Notification);
    }
    if !probe.has_overlay_privilege() {
        missing.push(Permission::Overlay);
    }
    missing
}

/// High-priority alert that can show over a locked screen.
pub trait AlertSurface: Send + Sync {
    fn post_alert(&self, alarm_id: i64, label: &str);
    fn cancel_alert(&self);
}

/// Where a ring's audio comes from, in decreasing order of preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum SoundSource {
    /// A sound bundled with the app, by resource name.
    Preset(String),
    Uri(Url),
    DefaultAlarm,
    DefaultNotification,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("sound source unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported sound source: {0}")]
    Unsupported(String),
}

/// Something that keeps playing until stopped.
pub trait Playback: Send {
    fn stop(&mut self);
}

pub trait AudioOutput: Send + Sync {
    fn play_looping(&self, source: &SoundSource) -> Result<Box<dyn Playback>, AudioError>;
    fn start_vibration(&self) -> Box<dyn Playback>;
}

/// Keeps the CPU awake; the provider releases it on its own after the timeout.
pub trait WakeLock: Send {
    fn release(&mut self);
}

pub trait WakeLockProvider: Send + Sync {
    fn acquire(&self, tag: &str, timeout: Duration) -> Box<dyn WakeLock>;
}

/// The minigame screen. It only ever reports success, through the ring machine.
pub trait ChallengePresenter: Send + Sync {
    /// `None` means the plain dismiss screen (challenge disabled).
    fn present(&self, alarm_id: i64, challenge: Option<(GameType, Difficulty)>);
}
