//! rollcall-store — SQLite persistence for identities, camera
//! configurations, and attendance records.

pub mod records;
pub mod report;
pub mod store;

pub use records::{AttendanceRecord, AttendanceRow, CameraConfig, IdentityRecord};
pub use report::render_csv;
pub use store::{SqliteStore, StoreError};
