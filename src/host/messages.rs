use crate::host::dtos::{AlarmDto, HistoryDto};
use crate::models::{Difficulty, GameType};
use crate::platform::{Permission, SoundSource};
use crate::ring::RingState;
use crate::scheduler::ArmOutcome;
use serde::{Deserialize, Serialize};

/// Messages from the platform shell.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    BootCompleted,
    #[serde(rename_all = "camelCase")]
    AlarmFired { alarm_id: i64 },
    #[serde(rename_all = "camelCase")]
    ChallengeSucceeded { alarm_id: i64 },
    #[serde(rename_all = "camelCase")]
    Snooze { alarm_id: i64 },
    #[serde(rename_all = "camelCase")]
    SessionTerminated { alarm_id: i64 },
    ReopenRinging,
    SaveAlarm { alarm: AlarmDto },
    #[serde(rename_all = "camelCase")]
    ToggleAlarm { alarm_id: i64, enabled: bool },
    #[serde(rename_all = "camelCase")]
    DeleteAlarm { alarm_id: i64 },
    ListAlarms,
    #[serde(rename_all = "camelCase")]
    GetHistory {
        alarm_id: i64,
        #[serde(default)]
        limit: Option<usize>,
    },
    PermissionsChanged {
        scheduling: bool,
        notification: bool,
        overlay: bool,
    },
    CheckPermissions,
}

/// Messages to the platform shell: replies and side effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Alarms { alarms: Vec<AlarmDto> },
    Saved { id: i64, schedule: ArmOutcome },
    #[serde(rename_all = "camelCase")]
    RingState {
        alarm_id: Option<i64>,
        state: RingState,
    },
    #[serde(rename_all = "camelCase")]
    History {
        alarm_id: i64,
        entries: Vec<HistoryDto>,
    },
    #[serde(rename_all = "camelCase")]
    Permissions {
        missing: Vec<Permission>,
        scheduling_blocked: bool,
    },
    #[serde(rename_all = "camelCase")]
    PostAlert { alarm_id: i64, label: String },
    CancelAlert,
    StartAudio { source: SoundSource },
    StopAudio,
    StartVibration,
    StopVibration,
    #[serde(rename_all = "camelCase")]
    PresentChallenge {
        alarm_id: i64,
        game_type: Option<GameType>,
        difficulty: Option<Difficulty>,
    },
    #[serde(rename_all = "camelCase")]
    AcquireWakeLock { tag: String, timeout_secs: u64 },
    ReleaseWakeLock { tag: String },
    BootFinished { armed: usize, failed: usize },
    Error { message: String },
    Ok,
}

impl OutgoingMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
