//! SQLite store. A single synchronous connection behind a mutex; all
//! callers (camera workers, the tracker, the CLI) take short exclusive
//! sections, which also serializes single-record read-modify-write.

use crate::records::{AttendanceRecord, AttendanceRow, CameraConfig, IdentityRecord};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("a camera named {0:?} already exists")]
    DuplicateCamera(String),
    #[error("an identity with external id {0:?} already exists")]
    DuplicateIdentity(String),
    #[error("identity not found: {0}")]
    IdentityNotFound(String),
    #[error("timestamp column malformed: {0}")]
    MalformedTimestamp(String),
    #[error("store lock poisoned")]
    Poisoned,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id                    INTEGER PRIMARY KEY,
    external_id           TEXT NOT NULL UNIQUE,
    display_name          TEXT NOT NULL,
    reference_image_path  TEXT NOT NULL,
    active                INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS cameras (
    id         INTEGER PRIMARY KEY,
    name       TEXT NOT NULL UNIQUE,
    source     TEXT NOT NULL,
    threshold  REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    id              INTEGER PRIMARY KEY,
    identity_id     INTEGER NOT NULL REFERENCES identities(id),
    date            TEXT NOT NULL,
    check_in_time   TEXT,
    check_out_time  TEXT,
    UNIQUE(identity_id, date)
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "opened attendance database");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // --- identities ---

    pub fn insert_identity(
        &self,
        external_id: &str,
        display_name: &str,
        reference_image_path: &str,
    ) -> Result<IdentityRecord, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO identities (external_id, display_name, reference_image_path, active)
             VALUES (?1, ?2, ?3, 1)",
            params![external_id, display_name, reference_image_path],
        )
        .map_err(|e| map_constraint(e, StoreError::DuplicateIdentity(external_id.to_string())))?;

        let id = conn.last_insert_rowid();
        Ok(IdentityRecord {
            id,
            external_id: external_id.to_string(),
            display_name: display_name.to_string(),
            reference_image_path: reference_image_path.to_string(),
            active: true,
        })
    }

    pub fn list_identities(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        self.query_identities("SELECT id, external_id, display_name, reference_image_path, active
                               FROM identities ORDER BY id")
    }

    /// Only active identities are eligible for matching.
    pub fn list_active_identities(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        self.query_identities("SELECT id, external_id, display_name, reference_image_path, active
                               FROM identities WHERE active = 1 ORDER BY id")
    }

    fn query_identities(&self, sql: &str) -> Result<Vec<IdentityRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], identity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_identity_active(&self, external_id: &str, active: bool) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE identities SET active = ?1 WHERE external_id = ?2",
            params![active as i64, external_id],
        )?;
        if changed == 0 {
            return Err(StoreError::IdentityNotFound(external_id.to_string()));
        }
        Ok(())
    }

    // --- cameras ---

    pub fn insert_camera(
        &self,
        name: &str,
        source: &str,
        threshold: f32,
    ) -> Result<CameraConfig, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO cameras (name, source, threshold) VALUES (?1, ?2, ?3)",
            params![name, source, threshold as f64],
        )
        .map_err(|e| map_constraint(e, StoreError::DuplicateCamera(name.to_string())))?;

        Ok(CameraConfig {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            source: source.to_string(),
            threshold,
        })
    }

    pub fn list_cameras(&self) -> Result<Vec<CameraConfig>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, source, threshold FROM cameras ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CameraConfig {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    source: row.get(2)?,
                    threshold: row.get::<_, f64>(3)? as f32,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn remove_camera(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM cameras WHERE name = ?1", params![name])?;
        Ok(changed > 0)
    }

    // --- attendance ---

    /// Fetch the (identity, day) record, creating an empty one if it
    /// does not exist. Atomic at single-record granularity: the insert
    /// and the read happen under one connection lock, and the UNIQUE
    /// constraint collapses concurrent creations onto one row.
    pub fn get_or_create_attendance(
        &self,
        identity_id: i64,
        date: NaiveDate,
    ) -> Result<AttendanceRecord, StoreError> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR IGNORE INTO attendance (identity_id, date) VALUES (?1, ?2)",
            params![identity_id, date_str],
        )?;

        let record = conn
            .query_row(
                "SELECT id, identity_id, date, check_in_time, check_out_time
                 FROM attendance WHERE identity_id = ?1 AND date = ?2",
                params![identity_id, date_str],
                attendance_from_row,
            )?
            .map_err(StoreError::MalformedTimestamp)?;
        Ok(record)
    }

    pub fn update_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE attendance SET check_in_time = ?1, check_out_time = ?2 WHERE id = ?3",
            params![
                record.check_in_time.map(|t| t.to_rfc3339()),
                record.check_out_time.map(|t| t.to_rfc3339()),
                record.id
            ],
        )?;
        Ok(())
    }

    /// Attendance rows joined with identity, optionally filtered by day
    /// and/or a case-insensitive name substring.
    pub fn list_attendance(
        &self,
        date: Option<NaiveDate>,
        name_contains: Option<&str>,
    ) -> Result<Vec<AttendanceRow>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT i.display_name, i.external_id,
                    a.id, a.identity_id, a.date, a.check_in_time, a.check_out_time
             FROM attendance a JOIN identities i ON i.id = a.identity_id
             WHERE (?1 IS NULL OR a.date = ?1)
               AND (?2 IS NULL OR instr(lower(i.display_name), lower(?2)) > 0)
             ORDER BY a.date, i.display_name",
        )?;

        let date_str = date.map(|d| d.format("%Y-%m-%d").to_string());
        let rows = stmt
            .query_map(params![date_str, name_contains], |row| {
                let display_name: String = row.get(0)?;
                let external_id: String = row.get(1)?;
                let record = attendance_from_row_offset(row, 2)?;
                Ok((display_name, external_id, record))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(display_name, external_id, record)| {
                Ok(AttendanceRow {
                    display_name,
                    external_id,
                    record: record.map_err(StoreError::MalformedTimestamp)?,
                })
            })
            .collect()
    }
}

/// Map a UNIQUE-constraint failure to a domain error; pass others through.
fn map_constraint(err: rusqlite::Error, duplicate: StoreError) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            duplicate
        }
        _ => StoreError::Sqlite(err),
    }
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<IdentityRecord> {
    Ok(IdentityRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        display_name: row.get(2)?,
        reference_image_path: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
    })
}

/// Timestamp parse failures surface as an inner Err so the rusqlite
/// row-mapping signature stays intact.
fn attendance_from_row(row: &Row<'_>) -> rusqlite::Result<Result<AttendanceRecord, String>> {
    attendance_from_row_offset(row, 0)
}

fn attendance_from_row_offset(
    row: &Row<'_>,
    offset: usize,
) -> rusqlite::Result<Result<AttendanceRecord, String>> {
    let id: i64 = row.get(offset)?;
    let identity_id: i64 = row.get(offset + 1)?;
    let date_str: String = row.get(offset + 2)?;
    let check_in: Option<String> = row.get(offset + 3)?;
    let check_out: Option<String> = row.get(offset + 4)?;

    Ok((|| {
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| format!("date {date_str:?}: {e}"))?;
        Ok(AttendanceRecord {
            id,
            identity_id,
            date,
            check_in_time: parse_timestamp(check_in)?,
            check_out_time: parse_timestamp(check_out)?,
        })
    })())
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>, String> {
    match raw {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| format!("{s:?}: {e}")),
    }
}
