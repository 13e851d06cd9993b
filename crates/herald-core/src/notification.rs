//! The notification entity and its state machine.
//!
//! A notification is one concrete occurrence of a recurring delivery. It is
//! never mutated in place: every transition returns a fresh snapshot with
//! `version + 1`, and the store rejects any write conditioned on a stale
//! version.

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Fixed namespace for deterministic UUIDv5 notification ids.
///
/// Every process derives the same id from the same
/// `(subject_id, target_instant_utc)` pair, so re-derivation during retries
/// or recovery can never mint a second entity for the same occurrence.
/// Generated once via `Uuid::new_v4()` and hardcoded.
pub const NOTIFICATION_NAMESPACE: Uuid = Uuid::from_bytes([
  0x6e, 0x21, 0x8a, 0x0f, 0x5d, 0x93, 0x4c, 0x7a, 0x9b, 0x44, 0x1c, 0xe2,
  0x0d, 0x8f, 0x72, 0x35,
]);

// ─── Kind ────────────────────────────────────────────────────────────────────

/// Discriminant selecting the occurrence strategy that produced (and
/// governs) a notification.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
  Birthday,
}

impl NotificationKind {
  /// The discriminant string stored in the `kind` column.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Birthday => "birthday",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "birthday" => Ok(Self::Birthday),
      other => Err(Error::UnsupportedKind(other.to_owned())),
    }
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle state of a single occurrence.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

impl NotificationStatus {
  /// Legal transition matrix. Everything not listed here is rejected.
  pub fn can_transition(self, to: Self) -> bool {
    matches!(
      (self, to),
      (Self::Pending, Self::Processing)
        | (Self::Processing, Self::Completed)
        | (Self::Processing, Self::Failed)
    )
  }

  /// Terminal occurrences are never reopened; a new cycle gets a new
  /// entity with a new id.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Failed)
  }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// The structured content POSTed to the delivery endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPayload {
  pub subject_id: Uuid,
  pub message:    String,
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// One scheduled delivery occurrence.
///
/// `target_utc` is the authoritative scheduling field. `target_local` and
/// `timezone` retain the originally intended wall-clock time so a timezone
/// change can recompute `target_utc` without losing the local intent; the
/// two are only ever rewritten together, through [`Notification::reschedule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  /// Deterministic UUIDv5 over `(subject_id, target_utc)` at creation time.
  /// Doubles as the delivery idempotency key. Stable across reschedules —
  /// identity belongs to the entity, not to its current target.
  pub id:           Uuid,
  pub subject_id:   Uuid,
  pub kind:         NotificationKind,
  pub status:       NotificationStatus,
  pub target_utc:   DateTime<Utc>,
  pub target_local: NaiveDateTime,
  /// Zone in effect when this occurrence was computed.
  pub timezone:     Tz,
  pub payload:      DeliveryPayload,
  /// Optimistic-lock counter; every transition increments it.
  pub version:      i64,
  pub retry_count:  u32,
  pub last_failure: Option<String>,
  pub executed_at:  Option<DateTime<Utc>>,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

impl Notification {
  /// Derive the occurrence id for `(subject_id, target_utc)`.
  ///
  /// The key uses second precision, the same as the stored `target_utc`
  /// column, so a persisted row always re-derives its own id.
  pub fn occurrence_id(subject_id: Uuid, target_utc: DateTime<Utc>) -> Uuid {
    let key = format!(
      "{}:{}",
      subject_id,
      target_utc.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    Uuid::new_v5(&NOTIFICATION_NAMESPACE, key.as_bytes())
  }

  /// Build a fresh pending occurrence.
  ///
  /// Callers must pass `target_utc` derived from `(target_local, timezone)`
  /// via [`crate::timezone::to_utc`]; [`crate::schedule`] is the one place
  /// that does so.
  pub fn pending(
    subject_id:   Uuid,
    kind:         NotificationKind,
    target_local: NaiveDateTime,
    timezone:     Tz,
    target_utc:   DateTime<Utc>,
    payload:      DeliveryPayload,
  ) -> Self {
    let now = Utc::now();
    Self {
      id: Self::occurrence_id(subject_id, target_utc),
      subject_id,
      kind,
      status: NotificationStatus::Pending,
      target_utc,
      target_local,
      timezone,
      payload,
      version: 1,
      retry_count: 0,
      last_failure: None,
      executed_at: None,
      created_at: now,
      updated_at: now,
    }
  }

  /// The calendar year of the occurrence in its own timezone. Backs the
  /// one-non-terminal-occurrence-per-`(subject, kind, year)` constraint.
  pub fn occurrence_year(&self) -> i32 { self.target_local.year() }

  fn transition(&self, to: NotificationStatus) -> Result<Self> {
    if !self.status.can_transition(to) {
      return Err(Error::IllegalTransition { from: self.status, to });
    }
    let mut next = self.clone();
    next.status = to;
    next.version = self.version + 1;
    next.updated_at = Utc::now();
    Ok(next)
  }

  /// `Pending → Processing`; the claim engine performs this transition as
  /// part of the atomic claim.
  pub fn claim(&self) -> Result<Self> {
    self.transition(NotificationStatus::Processing)
  }

  /// `Processing → Completed`, recording when and after how many retries
  /// the delivery went through.
  pub fn mark_completed(
    &self,
    executed_at: DateTime<Utc>,
    retries:     u32,
  ) -> Result<Self> {
    let mut next = self.transition(NotificationStatus::Completed)?;
    next.executed_at = Some(executed_at);
    next.retry_count = retries;
    next.last_failure = None;
    Ok(next)
  }

  /// `Processing → Failed`, recording the classified reason.
  pub fn mark_failed(
    &self,
    reason:  impl Into<String>,
    retries: u32,
  ) -> Result<Self> {
    let mut next = self.transition(NotificationStatus::Failed)?;
    next.last_failure = Some(reason.into());
    next.retry_count = retries;
    next.executed_at = Some(Utc::now());
    Ok(next)
  }

  /// Replace the scheduling fields while still `Pending`.
  ///
  /// In-flight and terminal occurrences are never rewritten; callers treat
  /// the error as a skip, not a crash.
  pub fn reschedule(
    &self,
    target_local: NaiveDateTime,
    timezone:     Tz,
    target_utc:   DateTime<Utc>,
    payload:      DeliveryPayload,
  ) -> Result<Self> {
    if self.status != NotificationStatus::Pending {
      return Err(Error::IllegalTransition {
        from: self.status,
        to:   NotificationStatus::Pending,
      });
    }
    let mut next = self.clone();
    next.target_local = target_local;
    next.timezone = timezone;
    next.target_utc = target_utc;
    next.payload = payload;
    next.version = self.version + 1;
    next.updated_at = Utc::now();
    Ok(next)
  }
}

// ─── Claimed-work handoff ────────────────────────────────────────────────────

/// The message handed to a delivery worker for one claimed notification.
///
/// The transport between claimer and worker is assumed at-least-once; the
/// idempotency key (the entity id) makes duplicate handoffs harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedWork {
  pub notification_id: Uuid,
  pub kind:            NotificationKind,
  pub idempotency_key: Uuid,
  pub target_utc:      DateTime<Utc>,
  pub payload:         DeliveryPayload,
}

impl From<&Notification> for ClaimedWork {
  fn from(n: &Notification) -> Self {
    Self {
      notification_id: n.id,
      kind:            n.kind,
      idempotency_key: n.id,
      target_utc:      n.target_utc,
      payload:         n.payload.clone(),
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
