//! Attendance tracker — the per-(identity, day) check-in/check-out
//! state machine.
//!
//! Transitions are explicit status values rather than exceptions; the
//! read-decide-write sequence for one (identity, day) key runs under a
//! key-scoped lock so concurrent camera workers observing the same
//! person produce exactly one state change.

use crate::interfaces::{AttendanceSink, Notifier, NotifyEvent, SourceError};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Outcome of observing one recognized match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First recognized match of the day.
    CheckedIn,
    /// Match within the debounce window; no state change.
    AlreadyCheckedIn,
    /// Match after the debounce window while checked in.
    CheckedOut,
    /// The day's record is complete; no state change.
    AlreadyCheckedOut,
    /// Stored record is inconsistent (check-out without check-in);
    /// rejected without touching state.
    Invalid,
}

impl Transition {
    /// Banner text shown on the annotated frame.
    pub fn banner(&self, name: &str) -> String {
        match self {
            Transition::CheckedIn => format!("{name}, checked in."),
            Transition::AlreadyCheckedIn => format!("{name}, already checked in."),
            Transition::CheckedOut => format!("{name}, checked out."),
            Transition::AlreadyCheckedOut => format!("{name}, already checked out."),
            Transition::Invalid => format!("{name}, attendance unavailable."),
        }
    }

    /// Whether this outcome changed stored state.
    pub fn is_state_change(&self) -> bool {
        matches!(self, Transition::CheckedIn | Transition::CheckedOut)
    }
}

/// One emitted state change, consumable by reporting layers.
#[derive(Debug, Clone)]
pub struct AttendanceEvent {
    pub identity_id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub transition: Transition,
    pub at: DateTime<Utc>,
}

pub struct AttendanceTracker {
    sink: Arc<dyn AttendanceSink>,
    notifier: Arc<dyn Notifier>,
    debounce: chrono::Duration,
    /// Key-scoped locks serializing read-decide-write per (identity, day).
    locks: Mutex<HashMap<(i64, NaiveDate), Arc<Mutex<()>>>>,
    events: broadcast::Sender<AttendanceEvent>,
}

impl AttendanceTracker {
    pub fn new(
        sink: Arc<dyn AttendanceSink>,
        notifier: Arc<dyn Notifier>,
        debounce: std::time::Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sink,
            notifier,
            debounce: chrono::Duration::from_std(debounce)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            locks: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to state-change events. Only `CheckedIn` and
    /// `CheckedOut` are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.events.subscribe()
    }

    /// Apply one recognized match to the state machine.
    pub fn observe(
        &self,
        identity_id: i64,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition, SourceError> {
        let date = now.date_naive();
        let key_lock = self.key_lock(identity_id, date);
        let _guard = key_lock
            .lock()
            .map_err(|_| SourceError("attendance key lock poisoned".into()))?;

        let mut record = self.sink.get_or_create(identity_id, date)?;

        let transition = match (record.check_in_time, record.check_out_time) {
            (None, None) => {
                record.check_in_time = Some(now);
                self.sink.update(&record)?;
                Transition::CheckedIn
            }
            (Some(check_in), None) => {
                if now - check_in > self.debounce {
                    record.check_out_time = Some(now);
                    self.sink.update(&record)?;
                    Transition::CheckedOut
                } else {
                    Transition::AlreadyCheckedIn
                }
            }
            (Some(_), Some(_)) => Transition::AlreadyCheckedOut,
            (None, Some(_)) => {
                tracing::warn!(
                    identity_id,
                    name,
                    %date,
                    "attendance record has check-out without check-in; rejecting transition"
                );
                Transition::Invalid
            }
        };

        if transition.is_state_change() {
            self.notifier.notify(match transition {
                Transition::CheckedIn => NotifyEvent::CheckIn,
                _ => NotifyEvent::CheckOut,
            });
            // Send fails only when nobody is subscribed.
            let _ = self.events.send(AttendanceEvent {
                identity_id,
                name: name.to_string(),
                date,
                transition,
                at: now,
            });
            tracing::info!(identity_id, name, ?transition, "attendance transition");
        } else {
            tracing::debug!(identity_id, name, ?transition, "attendance no-op");
        }

        Ok(transition)
    }

    fn key_lock(&self, identity_id: i64, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry((identity_id, date))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
