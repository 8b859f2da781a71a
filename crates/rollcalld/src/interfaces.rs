//! External collaborator seams: identity roster, attendance
//! persistence, and the success cue. The engine consumes these traits;
//! `SqliteStore` provides the production implementations.

use chrono::NaiveDate;
use rollcall_store::{AttendanceRecord, SqliteStore, StoreError};
use std::path::PathBuf;
use thiserror::Error;

/// Opaque collaborator failure, attributed at the call site.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct SourceError(pub String);

impl From<StoreError> for SourceError {
    fn from(err: StoreError) -> Self {
        SourceError(err.to_string())
    }
}

/// An active, enrolled identity as the recognition engine sees it.
#[derive(Debug, Clone)]
pub struct IdentityRef {
    pub id: i64,
    pub name: String,
    pub reference_image_path: PathBuf,
}

/// Supplies the set of identities currently eligible for matching.
pub trait IdentitySource: Send + Sync {
    fn list_active(&self) -> Result<Vec<IdentityRef>, SourceError>;
}

/// Attendance record persistence, atomic at single-record granularity.
pub trait AttendanceSink: Send + Sync {
    fn get_or_create(&self, identity_id: i64, date: NaiveDate)
        -> Result<AttendanceRecord, SourceError>;
    fn update(&self, record: &AttendanceRecord) -> Result<(), SourceError>;
}

/// Attendance cue kinds surfaced to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    CheckIn,
    CheckOut,
}

/// Fire-and-forget audio/visual cue. Failures are the implementation's
/// problem to log; they never propagate into the engine.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotifyEvent);
}

/// Default notifier: an info-level log line per cue.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: NotifyEvent) {
        tracing::info!(?event, "attendance cue");
    }
}

impl IdentitySource for SqliteStore {
    fn list_active(&self) -> Result<Vec<IdentityRef>, SourceError> {
        let identities = self.list_active_identities()?;
        Ok(identities
            .into_iter()
            .map(|record| IdentityRef {
                id: record.id,
                name: record.display_name,
                reference_image_path: PathBuf::from(record.reference_image_path),
            })
            .collect())
    }
}

impl AttendanceSink for SqliteStore {
    fn get_or_create(
        &self,
        identity_id: i64,
        date: NaiveDate,
    ) -> Result<AttendanceRecord, SourceError> {
        Ok(self.get_or_create_attendance(identity_id, date)?)
    }

    fn update(&self, record: &AttendanceRecord) -> Result<(), SourceError> {
        Ok(self.update_attendance(record)?)
    }
}
