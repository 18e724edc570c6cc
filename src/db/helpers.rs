// src/db/helpers.rs

use crate::db::Database;
use crate::error::{AppError, AppResult};
use log::warn;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lock the database, recovering from poisoning if necessary.
///
/// A panic while holding the lock cannot leave a half-written row behind
/// (every store call is one statement), so the connection stays usable.
pub fn lock_db<'a>(db: &'a Mutex<Database>, context: &str) -> MutexGuard<'a, Database> {
    match db.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{context}: database mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Execute a database operation with lock handling and error logging.
///
/// # Example
/// ```ignore
/// with_connection(&db, "load history", |conn| {
///     AlarmHistory::find_by_alarm(conn, alarm_id, 20)
/// })
/// ```
pub fn with_connection<F, T>(db: &Arc<Mutex<Database>>, operation: &str, f: F) -> AppResult<T>
where
    F: FnOnce(&Connection) -> rusqlite::Result<T>,
{
    let db = lock_db(db, operation);
    f(db.connection()).map_err(|e| {
        log::error!("Failed to {operation}: {e}");
        AppError::from(e)
    })
}
