//! Attendance writes with the once-per-identity-per-day guarantee.
//!
//! The `UNIQUE (identity, date)` constraint makes concurrent duplicate
//! submissions safe: the loser of the race reads back the existing row and
//! reports it as an already-recorded success, not an error.

use crate::{Store, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::AttendanceRecord;
use rusqlite::{params, Error as SqlError, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

/// Outcome of an attendance write.
#[derive(Debug, Clone)]
pub enum AttendanceOutcome {
    /// A new record was written.
    Recorded(AttendanceRecord),
    /// A record for this identity and date already existed; no write happened.
    AlreadyRecorded(AttendanceRecord),
}

impl AttendanceOutcome {
    pub fn record(&self) -> &AttendanceRecord {
        match self {
            AttendanceOutcome::Recorded(r) | AttendanceOutcome::AlreadyRecorded(r) => r,
        }
    }

    pub fn already_recorded(&self) -> bool {
        matches!(self, AttendanceOutcome::AlreadyRecorded(_))
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: row.get(0)?,
        identity: row.get(1)?,
        date: row
            .get::<_, String>(2)?
            .parse::<NaiveDate>()
            .unwrap_or_default(),
        recorded_at: row
            .get::<_, String>(3)?
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
        method: row.get(4)?,
        confidence: row.get(5)?,
        capture_path: row.get(6)?,
    })
}

const RECORD_COLUMNS: &str = "id, identity, date, recorded_at, method, confidence, capture_path";

fn is_unique_violation(err: &SqlError) -> bool {
    matches!(
        err,
        SqlError::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Store {
    pub fn find_attendance(
        &self,
        identity: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM attendance_records
                     WHERE identity = ?1 AND date = ?2"
                ),
                params![identity, date.to_string()],
                record_from_row,
            )
            .optional()?)
    }

    /// Write one attendance record for (identity, date), or return the
    /// existing one if the day is already covered.
    pub fn record_attendance(
        &self,
        identity: &str,
        date: NaiveDate,
        method: &str,
        confidence: Option<f32>,
        capture_path: Option<&str>,
    ) -> Result<AttendanceOutcome, StoreError> {
        let record = AttendanceRecord {
            id: Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            date,
            recorded_at: Utc::now(),
            method: method.to_string(),
            confidence,
            capture_path: capture_path.map(str::to_string),
        };

        let inserted = self.conn().execute(
            "INSERT INTO attendance_records
                 (id, identity, date, recorded_at, method, confidence, capture_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.identity,
                record.date.to_string(),
                record.recorded_at.to_rfc3339(),
                record.method,
                record.confidence,
                record.capture_path,
            ],
        );

        match inserted {
            Ok(_) => Ok(AttendanceOutcome::Recorded(record)),
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .find_attendance(identity, date)?
                    .ok_or_else(|| StoreError::WriteFailed("lost duplicate-attendance race".into()))?;
                tracing::info!(identity, %date, "attendance already recorded");
                Ok(AttendanceOutcome::AlreadyRecorded(existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn list_attendance_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE date = ?1 ORDER BY recorded_at"
        ))?;
        let rows = stmt.query_map(params![date.to_string()], record_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
