//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components call store methods; they never execute SQL directly.
//!
//! Every method runs on the store's single connection, so calls made
//! inside `immediate()` join that transaction.

use crate::{
    error::LoyaltyResult,
    event::{EventLogEntry, LoyaltyEvent},
    types::{TierId, YearMonth},
};
use chrono::{DateTime, Utc};
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    Connection, Transaction, TransactionBehavior,
};
use std::time::Duration;

mod audit;
mod client;
mod history;
mod units;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LoyaltyStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl LoyaltyStore {
    pub fn open(path: &str) -> LoyaltyResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LoyaltyResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> LoyaltyResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// True when `reopen()` reaches the same data.
    pub fn is_shared(&self) -> bool {
        self.path.is_some()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LoyaltyResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_history.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_units.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_override_audit.sql"))?;
        Ok(())
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction. The write lock is
    /// taken up front, so no other connection can mutate any client until
    /// this one commits. An `Err` from `f` rolls everything back.
    pub fn immediate<T>(&self, f: impl FnOnce() -> LoyaltyResult<T>) -> LoyaltyResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f()?;
        tx.commit()?;
        Ok(value)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> LoyaltyResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (client_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.client_id, entry.event_type, entry.payload, entry.created_at],
        )?;
        Ok(())
    }

    pub fn record_event(&self, event: &LoyaltyEvent, at: DateTime<Utc>) -> LoyaltyResult<()> {
        let entry = EventLogEntry::from_event(event, at)?;
        self.append_event(&entry)
    }

    /// Most recent `limit` events for a client, oldest first.
    pub fn events_for_client(&self, client_id: &str, limit: usize) -> LoyaltyResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, event_type, payload, created_at
             FROM event_log WHERE client_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let mut entries = stmt
            .query_map(params![client_id, limit as i64], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    client_id:  row.get(1)?,
                    event_type: row.get(2)?,
                    payload:    row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }

    pub fn event_count(&self, event_type: &str) -> LoyaltyResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ── Column codecs ──────────────────────────────────────────────

impl ToSql for TierId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TierId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for YearMonth {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for YearMonth {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
