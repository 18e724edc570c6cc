//! Weekday set encoded as a 7-bit mask.
//!
//! Bit 0 is Sunday, bit 6 is Saturday. A mask of 0 marks a one-shot alarm.

use crate::constants::REPEAT_MASK_ALL;
use chrono::Weekday;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Monday-first ordering used when listing days back to callers.
const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepeatDays(u8);

fn bit(day: Weekday) -> u8 {
    1 << day.num_days_from_sunday()
}

impl RepeatDays {
    pub const ONE_SHOT: Self = Self(0);
    pub const EVERY_DAY: Self = Self(REPEAT_MASK_ALL);

    /// Build from a raw mask; `None` if bits above Saturday are set.
    pub fn from_mask(mask: u8) -> Option<Self> {
        (mask <= REPEAT_MASK_ALL).then_some(Self(mask))
    }

    pub fn from_days<I>(days: I) -> Self
    where
        I: IntoIterator<Item = Weekday>,
    {
        Self(days.into_iter().fold(0, |acc, day| acc | bit(day)))
    }

    pub fn mask(self) -> u8 {
        self.0
    }

    pub fn is_one_shot(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & bit(day) != 0
    }

    /// Selected days, Monday first.
    pub fn days(self) -> Vec<Weekday> {
        WEEK.iter().copied().filter(|d| self.contains(*d)).collect()
    }
}

impl ToSql for RepeatDays {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.0)))
    }
}

impl FromSql for RepeatDays {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        u8::try_from(raw)
            .ok()
            .and_then(Self::from_mask)
            .ok_or(FromSqlError::OutOfRange(raw))
    }
}
