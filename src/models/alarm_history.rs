use rusqlite::{params, Connection, Result, Row};

/// One ring of one alarm: opened when the wake fires, closed when it resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmHistory {
    pub id: Option<i64>,
    /// Logical link only; rows outlive the alarm they describe.
    pub alarm_id: i64,
    pub fired_at: i64,
    /// `None` while still ringing (or if the session died mid-ring).
    pub dismissed_at: Option<i64>,
    pub snoozed_count: u32,
    pub game_success: bool,
}

impl AlarmHistory {
    /// Start a history row for a ring that just began (not yet saved).
    pub fn open(alarm_id: i64, fired_at: i64) -> Self {
        Self {
            id: None,
            alarm_id,
            fired_at,
            dismissed_at: None,
            snoozed_count: 0,
            game_success: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.dismissed_at.is_none()
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            alarm_id: row.get(1)?,
            fired_at: row.get(2)?,
            dismissed_at: row.get(3)?,
            snoozed_count: row.get(4)?,
            game_success: row.get::<_, i32>(5)? != 0,
        })
    }

    pub fn save(&mut self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO alarm_history (alarm_id, fired_at, dismissed_at, snoozed_count, game_success)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.alarm_id,
                self.fired_at,
                self.dismissed_at,
                self.snoozed_count,
                i32::from(self.game_success),
            ],
        )?;
        self.id = Some(conn.last_insert_rowid());
        Ok(())
    }

    /// Close the row with the ring's outcome.
    /// Returns an error if the row has not been saved yet (id is None).
    pub fn close(
        &mut self,
        conn: &Connection,
        dismissed_at: i64,
        snoozed_count: u32,
        game_success: bool,
    ) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            rusqlite::Error::InvalidParameterName(
                "Cannot close unsaved history row - call save() first".to_string(),
            )
        })?;

        conn.execute(
            "UPDATE alarm_history SET dismissed_at = ?1, snoozed_count = ?2, game_success = ?3
             WHERE id = ?4",
            params![dismissed_at, snoozed_count, i32::from(game_success), id],
        )?;

        self.dismissed_at = Some(dismissed_at);
        self.snoozed_count = snoozed_count;
        self.game_success = game_success;
        Ok(())
    }

    /// Close rows left open by rings whose session died, as unresolved.
    /// They keep the streak they were rung with, so the next ring carries it on.
    pub fn close_abandoned(
        conn: &Connection,
        alarm_id: i64,
        closed_at: i64,
        snoozed_count: u32,
    ) -> Result<usize> {
        conn.execute(
            "UPDATE alarm_history SET dismissed_at = ?1, snoozed_count = ?2, game_success = 0
             WHERE alarm_id = ?3 AND dismissed_at IS NULL",
            params![closed_at, snoozed_count, alarm_id],
        )
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, alarm_id, fired_at, dismissed_at, snoozed_count, game_success
             FROM alarm_history WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Most recent rings of an alarm, newest first.
    pub fn find_by_alarm(conn: &Connection, alarm_id: i64, limit: usize) -> Result<Vec<Self>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(
            "SELECT id, alarm_id, fired_at, dismissed_at, snoozed_count, game_success
             FROM alarm_history WHERE alarm_id = ?1
             ORDER BY fired_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![alarm_id, limit], Self::from_row)?;
        rows.collect()
    }

    /// Snoozes already spent on the current ring sequence of an alarm.
    ///
    /// The latest closed row decides: a snooze row carries its count forward,
    /// a dismissed row resets the sequence. Rows left open by a dead session
    /// are ignored.
    pub fn snooze_streak(conn: &Connection, alarm_id: i64) -> Result<u32> {
        let mut stmt = conn.prepare(
            "SELECT snoozed_count, game_success FROM alarm_history
             WHERE alarm_id = ?1 AND dismissed_at IS NOT NULL
             ORDER BY dismissed_at DESC, id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![alarm_id])?;

        if let Some(row) = rows.next()? {
            let count: u32 = row.get(0)?;
            let success = row.get::<_, i32>(1)? != 0;
            Ok(if success { 0 } else { count })
        } else {
            Ok(0)
        }
    }
}
