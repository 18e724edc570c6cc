//! Platform capabilities backed by the host shell.
//!
//! Every side effect becomes an [`OutgoingMessage`] on the outbox; the shell
//! performs it. Privilege state is whatever the shell last reported.

use crate::host::OutgoingMessage;
use crate::models::{Difficulty, GameType};
use crate::platform::types::{
    AlertSurface, AudioError, AudioOutput, ChallengePresenter, PermissionProbe, Playback,
    SoundSource, WakeLock, WakeLockProvider,
};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::Duration;

/// URL schemes the shell's media player can open.
const PLAYABLE_SCHEMES: &[&str] = &["file", "content", "android.resource", "http", "https"];

fn emit(outbox: &Sender<OutgoingMessage>, message: OutgoingMessage) {
    if outbox.send(message).is_err() {
        debug!("Host outbox closed, dropping message");
    }
}

pub struct ShellBridge {
    outbox: Mutex<Sender<OutgoingMessage>>,
    scheduling: AtomicBool,
    notification: AtomicBool,
    overlay: AtomicBool,
}

impl ShellBridge {
    /// All privileges start granted until the shell reports otherwise.
    pub fn new(outbox: Sender<OutgoingMessage>) -> Self {
        Self {
            outbox: Mutex::new(outbox),
            scheduling: AtomicBool::new(true),
            notification: AtomicBool::new(true),
            overlay: AtomicBool::new(true),
        }
    }

    pub fn set_permissions(&self, scheduling: bool, notification: bool, overlay: bool) {
        self.scheduling.store(scheduling, Ordering::SeqCst);
        self.notification.store(notification, Ordering::SeqCst);
        self.overlay.store(overlay, Ordering::SeqCst);
    }

    fn sender(&self) -> Sender<OutgoingMessage> {
        match self.outbox.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn send(&self, message: OutgoingMessage) {
        emit(&self.sender(), message);
    }
}

/// Sends its stop message once, on `stop()` or when dropped.
struct ShellHandle {
    outbox: Sender<OutgoingMessage>,
    on_stop: Option<OutgoingMessage>,
}

impl ShellHandle {
    fn finish(&mut self) {
        if let Some(message) = self.on_stop.take() {
            emit(&self.outbox, message);
        }
    }
}

impl Playback for ShellHandle {
    fn stop(&mut self) {
        self.finish();
    }
}

impl WakeLock for ShellHandle {
    fn release(&mut self) {
        self.finish();
    }
}

impl Drop for ShellHandle {
    fn drop(&mut self) {
        self.finish();
    }
}

impl PermissionProbe for ShellBridge {
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

impl AlertSurface for ShellBridge {
    fn post_alert(&self, alarm_id: i64, label: &str) {
        self.send(OutgoingMessage::PostAlert {
            alarm_id,
            label: label.to_string(),
        });
    }

    fn cancel_alert(&self) {
        self.send(OutgoingMessage::CancelAlert);
    }
}

impl AudioOutput for ShellBridge {
    fn play_looping(&self, source: &SoundSource) -> Result<Box<dyn Playback>, AudioError> {
        if let SoundSource::Uri(url) = source {
            if !PLAYABLE_SCHEMES.contains(&url.scheme()) {
                return Err(AudioError::Unsupported(url.to_string()));
            }
        }
        self.send(OutgoingMessage::StartAudio {
            source: source.clone(),
        });
        Ok(Box::new(ShellHandle {
            outbox: self.sender(),
            on_stop: Some(OutgoingMessage::StopAudio),
        }))
    }

    fn start_vibration(&self) -> Box<dyn Playback> {
        self.send(OutgoingMessage::StartVibration);
        Box::new(ShellHandle {
            outbox: self.sender(),
            on_stop: Some(OutgoingMessage::StopVibration),
        })
    }
}

impl WakeLockProvider for ShellBridge {
    fn acquire(&self, tag: &str, timeout: Duration) -> Box<dyn WakeLock> {
        self.send(OutgoingMessage::AcquireWakeLock {
            tag: tag.to_string(),
            timeout_secs: timeout.as_secs(),
        });
        Box::new(ShellHandle {
            outbox: self.sender(),
            on_stop: Some(OutgoingMessage::ReleaseWakeLock {
                tag: tag.to_string(),
            }),
        })
    }
}

impl ChallengePresenter for ShellBridge {
    fn present(&self, alarm_id: i64, challenge: Option<(GameType, Difficulty)>) {
        self.send(OutgoingMessage::PresentChallenge {
            alarm_id,
            game_type: challenge.map(|(game, _)| game),
            difficulty: challenge.map(|(_, difficulty)| difficulty),
        });
    }
}
