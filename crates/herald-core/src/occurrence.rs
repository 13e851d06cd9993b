//! Occurrence strategies — compute the next wall-clock occurrence for a
//! subject and format the payload delivered when it fires.
//!
//! One strategy per [`NotificationKind`]. The registry is built once at
//! startup and passed by reference into whatever needs it; looking up an
//! unregistered kind is a configuration error, not a per-call condition.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::{
  Error, Result,
  notification::{DeliveryPayload, NotificationKind},
  subject::SubjectSnapshot,
  timezone,
};

/// Wall-clock delivery time for calendar-anchored occurrences.
pub const DELIVERY_TIME: NaiveTime =
  match NaiveTime::from_hms_opt(9, 0, 0) {
    Some(t) => t,
    None => unreachable!(),
  };

// ─── Strategy trait ──────────────────────────────────────────────────────────

/// A recurrence rule for one notification kind.
///
/// Implementations are pure: no store access, no clock reads — the caller
/// supplies the reference instant.
pub trait OccurrenceStrategy: Send + Sync {
  /// The next occurrence strictly after `reference`, as a wall-clock time
  /// in the subject's zone. Conversion to UTC is the scheduler's job.
  fn next_occurrence(
    &self,
    subject:   &SubjectSnapshot,
    reference: DateTime<Utc>,
  ) -> NaiveDateTime;

  /// The payload delivered when an occurrence of this kind fires.
  fn payload(&self, subject: &SubjectSnapshot) -> DeliveryPayload;
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Maps notification kinds to their strategies.
///
/// Deliberately immutable after construction — there is no process-wide
/// mutable registry to poke at runtime.
pub struct StrategyRegistry {
  strategies: HashMap<NotificationKind, Box<dyn OccurrenceStrategy>>,
}

impl StrategyRegistry {
  pub fn new() -> Self {
    Self { strategies: HashMap::new() }
  }

  /// The registry with every built-in strategy registered.
  pub fn standard() -> Self {
    Self::new().with(NotificationKind::Birthday, Box::new(BirthdayStrategy))
  }

  pub fn with(
    mut self,
    kind:     NotificationKind,
    strategy: Box<dyn OccurrenceStrategy>,
  ) -> Self {
    self.strategies.insert(kind, strategy);
    self
  }

  /// Every kind with a registered strategy.
  pub fn kinds(&self) -> impl Iterator<Item = NotificationKind> + '_ {
    self.strategies.keys().copied()
  }

  pub fn get(&self, kind: NotificationKind) -> Result<&dyn OccurrenceStrategy> {
    self
      .strategies
      .get(&kind)
      .map(|s| s.as_ref())
      .ok_or_else(|| Error::UnsupportedKind(kind.as_str().to_owned()))
  }
}

impl Default for StrategyRegistry {
  fn default() -> Self { Self::standard() }
}

// ─── Birthday strategy ───────────────────────────────────────────────────────

/// Yearly occurrence on the subject's anchor month/day at
/// [`DELIVERY_TIME`] local.
pub struct BirthdayStrategy;

impl BirthdayStrategy {
  /// The anchor's month/day realised in `year`. Feb 29 anchors land on
  /// Feb 28 in non-leap years — never Mar 1.
  fn anchor_in_year(anchor: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, anchor.month(), anchor.day())
      .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
      .unwrap_or(anchor)
  }
}

impl OccurrenceStrategy for BirthdayStrategy {
  fn next_occurrence(
    &self,
    subject:   &SubjectSnapshot,
    reference: DateTime<Utc>,
  ) -> NaiveDateTime {
    let local_ref = timezone::to_local(reference, subject.timezone);
    let this_year = Self::anchor_in_year(subject.anchor, local_ref.year())
      .and_time(DELIVERY_TIME);
    if this_year > local_ref {
      this_year
    } else {
      Self::anchor_in_year(subject.anchor, local_ref.year() + 1)
        .and_time(DELIVERY_TIME)
    }
  }

  fn payload(&self, subject: &SubjectSnapshot) -> DeliveryPayload {
    DeliveryPayload {
      subject_id: subject.subject_id,
      message:    format!("Hey, {} it's your birthday", subject.full_name()),
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
