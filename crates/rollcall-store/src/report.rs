//! CSV rendering of attendance rows for the reporting layer.

use crate::records::AttendanceRow;
use chrono::{DateTime, Utc};

const HEADER: &str = "Name,ID,Date,Check-in Time,Check-out Time,Stayed Time";

/// Render attendance rows as CSV with a header line. The stayed-time
/// column is blank unless both check-in and check-out exist.
pub fn render_csv(rows: &[AttendanceRow]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');

    for row in rows {
        let record = &row.record;
        let stayed = record
            .stayed()
            .map(format_duration)
            .unwrap_or_default();

        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            escape(&row.display_name),
            escape(&row.external_id),
            record.date.format("%Y-%m-%d"),
            record.check_in_time.map(format_time).unwrap_or_default(),
            record.check_out_time.map(format_time).unwrap_or_default(),
            stayed,
        ));
    }

    out
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_duration(d: chrono::Duration) -> String {
    let total = d.num_seconds().max(0);
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Quote a field when it contains CSV metacharacters.
fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
