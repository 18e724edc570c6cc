use crate::constants::{DEFAULT_SNOOZE_MAX_COUNT, DEFAULT_SNOOZE_MINUTES};
use crate::repeat_days::RepeatDays;
use rusqlite::{params, Connection, Result, Row};
use serde::{Deserialize, Serialize};

/// Minigame variant shown while the alarm rings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameType {
    #[default]
    Mole,
    MoleHell,
    Smash,
}

impl GameType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mole => "MOLE",
            Self::MoleHell => "MOLE_HELL",
            Self::Smash => "SMASH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MOLE" => Some(Self::Mole),
            "MOLE_HELL" => Some(Self::MoleHell),
            "SMASH" => Some(Self::Smash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
    Hell,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "EASY",
            Self::Normal => "NORMAL",
            Self::Hard => "HARD",
            Self::Hell => "HELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EASY" => Some(Self::Easy),
            "NORMAL" => Some(Self::Normal),
            "HARD" => Some(Self::Hard),
            "HELL" => Some(Self::Hell),
            _ => None,
        }
    }
}

/// Which sound the alarm plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ref", rename_all = "snake_case")]
pub enum SoundSelector {
    /// A bundled preset by name; `None` means the OS default alarm sound.
    Ringtone(Option<String>),
    /// A user-picked sound, stored as a URL.
    Custom(String),
}

impl Default for SoundSelector {
    fn default() -> Self {
        Self::Ringtone(None)
    }
}

impl SoundSelector {
    pub fn sound_type(&self) -> &'static str {
        match self {
            Self::Ringtone(_) => "RINGTONE",
            Self::Custom(_) => "CUSTOM",
        }
    }

    pub fn sound_ref(&self) -> Option<&str> {
        match self {
            Self::Ringtone(name) => name.as_deref(),
            Self::Custom(uri) => Some(uri.as_str()),
        }
    }

    fn from_columns(sound_type: &str, sound_ref: Option<String>) -> Self {
        match (sound_type, sound_ref) {
            ("CUSTOM", Some(uri)) => Self::Custom(uri),
            (_, name) => Self::Ringtone(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnoozeConfig {
    pub enabled: bool,
    pub interval_minutes: u32,
    pub max_count: u32,
}

impl Default for SnoozeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: DEFAULT_SNOOZE_MINUTES,
            max_count: DEFAULT_SNOOZE_MAX_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChallengeConfig {
    pub enabled: bool,
    pub game_type: GameType,
    pub difficulty: Difficulty,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            game_type: GameType::default(),
            difficulty: Difficulty::default(),
        }
    }
}

/// A configured alarm and its precomputed next fire time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    /// `None` until the store assigns a permanent id.
    pub id: Option<i64>,
    pub hour: u32,
    pub minute: u32,
    pub repeat: RepeatDays,
    pub enabled: bool,
    pub label: String,
    pub sound: SoundSelector,
    pub vibrate: bool,
    pub snooze: SnoozeConfig,
    pub challenge: ChallengeConfig,
    /// Epoch milliseconds; the only value the wake scheduler consumes.
    pub next_trigger_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const COLUMNS: &str = "id, hour, minute, repeat_mask, enabled, label, sound_type, sound_ref, vibrate,
     snooze_enabled, snooze_minutes, snooze_max_count, game_enabled, game_type, difficulty,
     next_trigger_at, created_at, updated_at";

impl Alarm {
    /// Create a new enabled one-shot alarm with edit-flow defaults (not yet saved).
    pub fn new(hour: u32, minute: u32) -> Self {
        Self {
            id: None,
            hour,
            minute,
            repeat: RepeatDays::ONE_SHOT,
            enabled: true,
            label: String::new(),
            sound: SoundSelector::default(),
            vibrate: true,
            snooze: SnoozeConfig::default(),
            challenge: ChallengeConfig::default(),
            next_trigger_at: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn is_repeating(&self) -> bool {
        !self.repeat.is_one_shot()
    }

    /// Whether the user may snooze once more after `snoozed_so_far` snoozes.
    pub fn can_snooze(&self, snoozed_so_far: u32) -> bool {
        self.snooze.enabled && snoozed_so_far < self.snooze.max_count
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        let sound_type: String = row.get(6)?;
        let game_type: String = row.get(13)?;
        let difficulty: String = row.get(14)?;

        Ok(Self {
            id: Some(row.get(0)?),
            hour: row.get(1)?,
            minute: row.get(2)?,
            repeat: row.get(3)?,
            enabled: row.get::<_, i32>(4)? != 0,
            label: row.get(5)?,
            sound: SoundSelector::from_columns(&sound_type, row.get(7)?),
            vibrate: row.get::<_, i32>(8)? != 0,
            snooze: SnoozeConfig {
                enabled: row.get::<_, i32>(9)? != 0,
                interval_minutes: row.get(10)?,
                max_count: row.get(11)?,
            },
            challenge: ChallengeConfig {
                enabled: row.get::<_, i32>(12)? != 0,
                game_type: GameType::parse(&game_type).unwrap_or_default(),
                difficulty: Difficulty::parse(&difficulty).unwrap_or_default(),
            },
            next_trigger_at: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }

    /// Insert the alarm, assigning its permanent id and both timestamps.
    pub fn save(&mut self, conn: &Connection, now: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO alarms (hour, minute, repeat_mask, enabled, label, sound_type, sound_ref,
                 vibrate, snooze_enabled, snooze_minutes, snooze_max_count, game_enabled,
                 game_type, difficulty, next_trigger_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                self.hour,
                self.minute,
                self.repeat,
                i32::from(self.enabled),
                self.label,
                self.sound.sound_type(),
                self.sound.sound_ref(),
                i32::from(self.vibrate),
                i32::from(self.snooze.enabled),
                self.snooze.interval_minutes,
                self.snooze.max_count,
                i32::from(self.challenge.enabled),
                self.challenge.game_type.as_str(),
                self.challenge.difficulty.as_str(),
                self.next_trigger_at,
                now,
                now,
            ],
        )?;
        self.id = Some(conn.last_insert_rowid());
        self.created_at = now;
        self.updated_at = now;
        Ok(())
    }

    /// Replace every editable column of an existing alarm.
    ///
    /// Returns `false` when the row no longer exists. `created_at` is kept.
    pub fn update(&mut self, conn: &Connection, now: i64) -> Result<bool> {
        let id = self.id.ok_or_else(|| {
            rusqlite::Error::InvalidParameterName("Cannot update unsaved alarm".to_string())
        })?;

        let rows_affected = conn.execute(
            "UPDATE alarms
             SET hour = ?1, minute = ?2, repeat_mask = ?3, enabled = ?4, label = ?5,
                 sound_type = ?6, sound_ref = ?7, vibrate = ?8, snooze_enabled = ?9,
                 snooze_minutes = ?10, snooze_max_count = ?11, game_enabled = ?12,
                 game_type = ?13, difficulty = ?14, next_trigger_at = ?15, updated_at = ?16
             WHERE id = ?17",
            params![
                self.hour,
                self.minute,
                self.repeat,
                i32::from(self.enabled),
                self.label,
                self.sound.sound_type(),
                self.sound.sound_ref(),
                i32::from(self.vibrate),
                i32::from(self.snooze.enabled),
                self.snooze.interval_minutes,
                self.snooze.max_count,
                i32::from(self.challenge.enabled),
                self.challenge.game_type.as_str(),
                self.challenge.difficulty.as_str(),
                self.next_trigger_at,
                now,
                id,
            ],
        )?;
        if rows_affected == 0 {
            return Ok(false);
        }
        self.updated_at = now;
        Ok(true)
    }

    /// All alarms, enabled first, then by next trigger time.
    pub fn find_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM alarms ORDER BY enabled DESC, next_trigger_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }

    pub fn find_enabled(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM alarms WHERE enabled = 1 ORDER BY next_trigger_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM alarms WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
        let rows_affected = conn.execute("DELETE FROM alarms WHERE id = ?1", params![id])?;
        Ok(rows_affected > 0)
    }

    pub fn set_enabled(conn: &Connection, id: i64, enabled: bool, updated_at: i64) -> Result<bool> {
        let rows_affected = conn.execute(
            "UPDATE alarms SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            params![i32::from(enabled), updated_at, id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Enable an alarm together with its freshly computed trigger time.
    pub fn reenable(
        conn: &Connection,
        id: i64,
        next_trigger_at: i64,
        updated_at: i64,
    ) -> Result<bool> {
        let rows_affected = conn.execute(
            "UPDATE alarms SET enabled = 1, next_trigger_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![next_trigger_at, updated_at, id],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn set_next_trigger(
        conn: &Connection,
        id: i64,
        next_trigger_at: i64,
        updated_at: i64,
    ) -> Result<bool> {
        let rows_affected = conn.execute(
            "UPDATE alarms SET next_trigger_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![next_trigger_at, updated_at, id],
        )?;
        Ok(rows_affected > 0)
    }
}
