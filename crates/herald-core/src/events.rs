//! Domain events consumed from the subject (user) bounded context.
//!
//! Payloads are primitive-typed on purpose: the owning context stays free to
//! evolve its own entities without dragging this crate along.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectCreated {
  pub subject_id:  Uuid,
  pub first_name:  String,
  pub last_name:   String,
  pub anchor:      NaiveDate,
  pub timezone:    Tz,
  pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAnchorChanged {
  pub subject_id:  Uuid,
  pub old_anchor:  NaiveDate,
  pub new_anchor:  NaiveDate,
  pub timezone:    Tz,
  pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectTimezoneChanged {
  pub subject_id:   Uuid,
  pub old_timezone: Tz,
  pub new_timezone: Tz,
  pub anchor:       NaiveDate,
  pub occurred_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectDeleted {
  pub subject_id:  Uuid,
  pub occurred_at: DateTime<Utc>,
}

// ─── Envelope ────────────────────────────────────────────────────────────────

/// The closed set of events the bus routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
  SubjectCreated(SubjectCreated),
  SubjectAnchorChanged(SubjectAnchorChanged),
  SubjectTimezoneChanged(SubjectTimezoneChanged),
  SubjectDeleted(SubjectDeleted),
}

/// Discriminant used as the subscription key on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  SubjectCreated,
  SubjectAnchorChanged,
  SubjectTimezoneChanged,
  SubjectDeleted,
}

impl EventKind {
  pub const ALL: [Self; 4] = [
    Self::SubjectCreated,
    Self::SubjectAnchorChanged,
    Self::SubjectTimezoneChanged,
    Self::SubjectDeleted,
  ];
}

impl DomainEvent {
  pub fn kind(&self) -> EventKind {
    match self {
      Self::SubjectCreated(_) => EventKind::SubjectCreated,
      Self::SubjectAnchorChanged(_) => EventKind::SubjectAnchorChanged,
      Self::SubjectTimezoneChanged(_) => EventKind::SubjectTimezoneChanged,
      Self::SubjectDeleted(_) => EventKind::SubjectDeleted,
    }
  }

  /// The aggregate the event is about; used in failure logs.
  pub fn subject_id(&self) -> Uuid {
    match self {
      Self::SubjectCreated(e) => e.subject_id,
      Self::SubjectAnchorChanged(e) => e.subject_id,
      Self::SubjectTimezoneChanged(e) => e.subject_id,
      Self::SubjectDeleted(e) => e.subject_id,
    }
  }
}
