// src/constants.rs

/// Milliseconds in one minute
pub const MILLIS_PER_MINUTE: i64 = 60 * 1000;

/// Milliseconds in one nominal (non-DST) day
pub const MILLIS_PER_DAY: i64 = 24 * 60 * MILLIS_PER_MINUTE;

/// Valid snooze interval range in minutes
pub const SNOOZE_MINUTES_MIN: u32 = 1;
pub const SNOOZE_MINUTES_MAX: u32 = 60;

/// Valid snooze max-count range
pub const SNOOZE_COUNT_MIN: u32 = 1;
pub const SNOOZE_COUNT_MAX: u32 = 10;

/// Defaults used by the edit flow for a fresh alarm
pub const DEFAULT_SNOOZE_MINUTES: u32 = 5;
pub const DEFAULT_SNOOZE_MAX_COUNT: u32 = 3;

/// Maximum alarm label length (characters)
pub const MAX_LABEL_LEN: usize = 40;

/// Highest valid repeat-day bitmask (all seven days)
pub const REPEAT_MASK_ALL: u8 = 0b111_1111;

/// Default bound on how long the wake lock may be held while a ring starts
pub const DEFAULT_WAKE_LOCK_TIMEOUT_SECS: u64 = 10;

/// Default time the OS grants a boot receiver before it may kill the process
pub const DEFAULT_BOOT_DEADLINE_SECS: u64 = 10;

/// Default number of history rows returned per alarm
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Tag attached to the wake lock taken on alarm fire
pub const WAKE_LOCK_TAG: &str = "AlarmGame:WakeLock";

/// Longest the in-process timer thread sleeps before re-reading the wall clock
pub const TIMER_MAX_WAIT_MS: u64 = 30_000;

/// Largest host protocol frame accepted (1MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
