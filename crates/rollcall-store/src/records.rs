use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// An enrolled identity. Only `active` identities are eligible for
/// matching; flipping the flag takes effect on the next gallery refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: i64,
    /// Externally assigned identifier (badge / student id).
    pub external_id: String,
    pub display_name: String,
    /// Path to the reference image used to build the gallery.
    pub reference_image_path: String,
    pub active: bool,
}

/// Camera configuration: unique name, capture source (device index or
/// URL), and the per-camera match threshold in (0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: i64,
    pub name: String,
    pub source: String,
    pub threshold: f32,
}

/// One attendance row per (identity, calendar day). Created lazily on
/// the first recognized match of the day; never deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub identity_id: i64,
    pub date: NaiveDate,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    /// Time between check-in and check-out, when both exist.
    pub fn stayed(&self) -> Option<chrono::Duration> {
        match (self.check_in_time, self.check_out_time) {
            (Some(check_in), Some(check_out)) => Some(check_out - check_in),
            _ => None,
        }
    }
}

/// Attendance record joined with its identity, for listing and export.
#[derive(Debug, Clone)]
pub struct AttendanceRow {
    pub display_name: String,
    pub external_id: String,
    pub record: AttendanceRecord,
}
