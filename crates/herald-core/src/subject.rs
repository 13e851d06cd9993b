//! Subject snapshot — the immutable view of an external subject.
//!
//! Subjects are owned by the user bounded context. Herald never mutates
//! them; it consumes immutable snapshots carried on domain events, and keeps
//! a local read model so the next cycle can be scheduled after a delivery
//! completes without calling back into the owning context.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point-in-time copy of the subject fields Herald schedules from.
///
/// `timezone` is the zone currently configured for the subject; each
/// notification captures its own zone snapshot at computation time, so a
/// later change here never rewrites history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSnapshot {
  pub subject_id: Uuid,
  pub first_name: String,
  pub last_name:  String,
  /// Recurrence anchor — the calendar date yearly occurrences derive from
  /// (e.g. a date of birth).
  pub anchor:     NaiveDate,
  pub timezone:   Tz,
  pub updated_at: DateTime<Utc>,
}

impl SubjectSnapshot {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}
