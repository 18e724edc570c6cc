pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS alarms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hour INTEGER NOT NULL,
    minute INTEGER NOT NULL,
    repeat_mask INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    label TEXT NOT NULL DEFAULT '',
    sound_type TEXT NOT NULL,
    sound_ref TEXT,
    vibrate INTEGER NOT NULL DEFAULT 1,
    snooze_enabled INTEGER NOT NULL DEFAULT 1,
    snooze_minutes INTEGER NOT NULL,
    snooze_max_count INTEGER NOT NULL,
    game_enabled INTEGER NOT NULL DEFAULT 0,
    game_type TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    next_trigger_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS alarm_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alarm_id INTEGER NOT NULL,
    fired_at INTEGER NOT NULL,
    dismissed_at INTEGER,
    snoozed_count INTEGER NOT NULL DEFAULT 0,
    game_success INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_alarms_enabled ON alarms(enabled, next_trigger_at);
CREATE INDEX IF NOT EXISTS idx_alarm_history_alarm ON alarm_history(alarm_id, fired_at);
";
