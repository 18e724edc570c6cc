use crate::constants::{
    MAX_LABEL_LEN, REPEAT_MASK_ALL, SNOOZE_COUNT_MAX, SNOOZE_COUNT_MIN, SNOOZE_MINUTES_MAX,
    SNOOZE_MINUTES_MIN,
};
use crate::error::AppError;
use crate::models::{Alarm, SnoozeConfig, SoundSelector};
use crate::repeat_days::RepeatDays;
use url::Url;

/// Validate the wall-clock time of an alarm.
pub fn validate_time(hour: u32, minute: u32) -> Result<(), AppError> {
    if hour >= 24 {
        return Err(AppError::InvalidInput {
            field: "hour",
            reason: "must be 0-23".into(),
        });
    }
    if minute >= 60 {
        return Err(AppError::InvalidInput {
            field: "minute",
            reason: "must be 0-59".into(),
        });
    }
    Ok(())
}

/// Parse a raw repeat mask (bit 0 = Sunday).
pub fn repeat_from_mask(mask: i64) -> Result<RepeatDays, AppError> {
    u8::try_from(mask)
        .ok()
        .and_then(RepeatDays::from_mask)
        .ok_or_else(|| AppError::InvalidInput {
            field: "repeat_mask",
            reason: format!("{mask} is outside 0-{REPEAT_MASK_ALL}"),
        })
}

pub fn validate_snooze(snooze: &SnoozeConfig) -> Result<(), AppError> {
    if !(SNOOZE_MINUTES_MIN..=SNOOZE_MINUTES_MAX).contains(&snooze.interval_minutes) {
        return Err(AppError::InvalidInput {
            field: "snooze_minutes",
            reason: format!("must be {SNOOZE_MINUTES_MIN}-{SNOOZE_MINUTES_MAX}"),
        });
    }
    if !(SNOOZE_COUNT_MIN..=SNOOZE_COUNT_MAX).contains(&snooze.max_count) {
        return Err(AppError::InvalidInput {
            field: "snooze_max_count",
            reason: format!("must be {SNOOZE_COUNT_MIN}-{SNOOZE_COUNT_MAX}"),
        });
    }
    Ok(())
}

/// Clamp a snooze interval picked in the edit flow into the accepted range.
pub fn clamp_snooze_minutes(minutes: u32) -> u32 {
    minutes.clamp(SNOOZE_MINUTES_MIN, SNOOZE_MINUTES_MAX)
}

pub fn clamp_snooze_count(count: u32) -> u32 {
    count.clamp(SNOOZE_COUNT_MIN, SNOOZE_COUNT_MAX)
}

/// Trim and cap a label at the maximum length (in characters).
pub fn normalize_label(label: &str) -> String {
    label.trim().chars().take(MAX_LABEL_LEN).collect()
}

pub fn validate_label(label: &str) -> Result<(), AppError> {
    if label.chars().count() > MAX_LABEL_LEN {
        return Err(AppError::InvalidInput {
            field: "label",
            reason: format!("cannot exceed {MAX_LABEL_LEN} characters"),
        });
    }
    Ok(())
}

/// Custom sounds must be a well-formed URL. Unknown preset names are
/// accepted and fall back to the default sound at ring time.
pub fn validate_sound(sound: &SoundSelector) -> Result<(), AppError> {
    match sound {
        SoundSelector::Ringtone(_) => Ok(()),
        SoundSelector::Custom(uri) => {
            Url::parse(uri).map_err(|e| AppError::InvalidInput {
                field: "sound_ref",
                reason: format!("invalid sound URL: {e}"),
            })?;
            Ok(())
        }
    }
}

/// Validate everything the edit flow can set on an alarm.
pub fn validate_alarm(alarm: &Alarm) -> Result<(), AppError> {
    validate_time(alarm.hour, alarm.minute)?;
    validate_snooze(&alarm.snooze)?;
    validate_label(&alarm.label)?;
    validate_sound(&alarm.sound)
}
