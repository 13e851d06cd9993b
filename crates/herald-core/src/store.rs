//! The `NotificationStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g.
//! `herald-store-sqlite`). Higher layers (`herald-worker`, the scheduling
//! service) depend on this abstraction, not on any concrete backend.
//!
//! The store is the single source of truth and the only cross-process
//! synchronisation point in the system: [`NotificationStore::claim_ready`]
//! is the one operation that needs true mutual exclusion, and every write
//! that follows a claim is single-writer-per-row by construction.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{notification::Notification, subject::SubjectSnapshot};

/// Abstraction over a Herald persistence backend.
pub trait NotificationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Subject snapshots (event-fed read model) ──────────────────────────

  /// Insert or replace the local snapshot of an external subject.
  fn upsert_subject(
    &self,
    snapshot: &SubjectSnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Retrieve a subject snapshot. Returns `None` if unknown.
  fn get_subject(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Option<SubjectSnapshot>, Self::Error>> + Send + '_;

  /// Every known subject snapshot. The recovery pass walks this to
  /// re-derive any missing next-cycle occurrences.
  fn list_subjects(
    &self,
  ) -> impl Future<Output = Result<Vec<SubjectSnapshot>, Self::Error>> + Send + '_;

  /// Remove a subject snapshot. Returns whether a row was removed.
  /// Callers delete the subject's notifications first (cascade order).
  fn delete_subject(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Notifications ─────────────────────────────────────────────────────

  /// Persist a freshly-built pending notification.
  ///
  /// Returns `true` if the row was inserted, `false` if an equivalent
  /// non-terminal occurrence already exists for the same
  /// `(subject, kind, occurrence year)` — creation is idempotent.
  fn create(
    &self,
    notification: &Notification,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn find_by_id(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Notification>, Self::Error>> + Send + '_;

  fn find_by_subject(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  /// Write `notification` on the condition that the stored row still holds
  /// `expected_version`.
  ///
  /// The entity's own `version` has already been incremented by the
  /// transition that produced it, so callers always pass the
  /// pre-transition number explicitly — never derive it by subtraction.
  fn update(
    &self,
    notification:     &Notification,
    expected_version: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove all notifications owned by `subject_id`. Returns the removed
  /// count.
  fn delete_by_subject(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Claim & recovery ──────────────────────────────────────────────────

  /// Atomically select up to `limit` due pending notifications (oldest
  /// target first), transition them to processing, and return the claimed
  /// snapshots.
  ///
  /// Selection, lock, and transition are one unit: no caller may observe a
  /// row mid-transition, and concurrent callers never receive the same
  /// row — racing callers get disjoint batches.
  fn claim_ready(
    &self,
    now:   DateTime<Utc>,
    limit: u32,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  /// Pending notifications whose target instant passed before `now`,
  /// oldest first — the recovery pass's worklist.
  fn find_overdue(
    &self,
    now:   DateTime<Utc>,
    limit: u32,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  /// Requeue processing rows untouched since before `cutoff` back to
  /// pending, bumping their version. Returns the requeued count.
  ///
  /// Covers workers that died after claiming but before finishing.
  fn requeue_stale(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
