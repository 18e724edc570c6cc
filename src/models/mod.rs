pub mod alarm;
pub mod alarm_history;

pub use alarm::{Alarm, ChallengeConfig, Difficulty, GameType, SnoozeConfig, SoundSelector};
pub use alarm_history::AlarmHistory;
