use crate::error::AppResult;
use crate::models::{Alarm, AlarmHistory, ChallengeConfig, SnoozeConfig, SoundSelector};
use crate::validation::{
    clamp_snooze_count, clamp_snooze_minutes, normalize_label, repeat_from_mask,
};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Alarm as exchanged with the shell. `id` 0 or absent means "new".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmDto {
    #[serde(default)]
    pub id: i64,
    pub hour: u32,
    pub minute: u32,
    #[serde(default)]
    pub repeat_mask: i64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub sound: SoundSelector,
    #[serde(default = "default_true")]
    pub vibrate: bool,
    #[serde(default)]
    pub snooze: SnoozeConfig,
    #[serde(default)]
    pub challenge: ChallengeConfig,
    #[serde(default)]
    pub next_trigger_at: i64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl From<Alarm> for AlarmDto {
    fn from(alarm: Alarm) -> Self {
        Self {
            id: alarm.id.unwrap_or(0),
            hour: alarm.hour,
            minute: alarm.minute,
            repeat_mask: i64::from(alarm.repeat.mask()),
            enabled: alarm.enabled,
            label: alarm.label,
            sound: alarm.sound,
            vibrate: alarm.vibrate,
            snooze: alarm.snooze,
            challenge: alarm.challenge,
            next_trigger_at: alarm.next_trigger_at,
            created_at: alarm.created_at,
            updated_at: alarm.updated_at,
        }
    }
}

impl AlarmDto {
    /// Convert an edit from the shell. Timestamps are owned by the store and
    /// the trigger time by the service, so the ones sent in are ignored.
    /// Snooze settings outside the pickers' ranges are clamped into them.
    pub fn into_alarm(self) -> AppResult<Alarm> {
        let repeat = repeat_from_mask(self.repeat_mask)?;
        let snooze = SnoozeConfig {
            interval_minutes: clamp_snooze_minutes(self.snooze.interval_minutes),
            max_count: clamp_snooze_count(self.snooze.max_count),
            ..self.snooze
        };
        Ok(Alarm {
            id: (self.id > 0).then_some(self.id),
            hour: self.hour,
            minute: self.minute,
            repeat,
            enabled: self.enabled,
            label: normalize_label(&self.label),
            sound: self.sound,
            vibrate: self.vibrate,
            snooze,
            challenge: self.challenge,
            next_trigger_at: 0,
            created_at: 0,
            updated_at: 0,
        })
    }
}

/// One ring. `dismissedAt` stays null while the ring is live; a ring whose
/// session died is closed, unresolved, when the alarm next rings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDto {
    pub id: i64,
    pub alarm_id: i64,
    pub fired_at: i64,
    pub dismissed_at: Option<i64>,
    pub snoozed_count: u32,
    pub game_success: bool,
}

impl From<AlarmHistory> for HistoryDto {
    fn from(row: AlarmHistory) -> Self {
        Self {
            id: row.id.unwrap_or(0),
            alarm_id: row.alarm_id,
            fired_at: row.fired_at,
            dismissed_at: row.dismissed_at,
            snoozed_count: row.snoozed_count,
            game_success: row.game_success,
        }
    }
}
