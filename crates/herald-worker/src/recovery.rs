//! Recovery: requeue abandoned claims and close crash-induced gaps in the
//! schedule.
//!
//! Two entry points: [`Recovery::startup`] runs once before the first poll,
//! [`Recovery::sweep`] runs on an interval alongside it. Neither touches
//! rows a live worker holds a fresh claim on.

use std::sync::Arc;

use chrono::Utc;
use herald_core::{schedule::Scheduler, store::NotificationStore};

use crate::{Error, Result};

/// Cap on the overdue rows surfaced per recovery pass.
const OVERDUE_BATCH: u32 = 1000;

pub struct Recovery<S> {
  store:       Arc<S>,
  scheduler:   Arc<Scheduler<S>>,
  stale_after: chrono::Duration,
}

impl<S> Recovery<S>
where
  S: NotificationStore,
{
  pub fn new(
    store:       Arc<S>,
    scheduler:   Arc<Scheduler<S>>,
    stale_after: chrono::Duration,
  ) -> Self {
    Self { store, scheduler, stale_after }
  }

  /// Return claims older than the staleness budget to `pending`.
  pub async fn sweep(&self) -> Result<u64> {
    let cutoff = Utc::now() - self.stale_after;
    let requeued = self
      .store
      .requeue_stale(cutoff)
      .await
      .map_err(Error::store)?;
    if requeued > 0 {
      tracing::warn!(requeued, "returned stale claims to pending");
    }
    Ok(requeued)
  }

  /// One-time pass at boot: sweep stale claims, surface the overdue
  /// backlog, and re-derive any missing next-cycle occurrences.
  ///
  /// Overdue pending rows need no special handling beyond logging — the
  /// first poll claims them because their target is in the past.
  pub async fn startup(&self) -> Result<()> {
    self.sweep().await?;

    // Bounded batch so a long outage cannot balloon recovery memory.
    let overdue = self
      .store
      .find_overdue(Utc::now(), OVERDUE_BATCH)
      .await
      .map_err(Error::store)?;
    if !overdue.is_empty() {
      tracing::warn!(
        count = overdue.len(),
        "overdue notifications found at startup; the next poll will claim them"
      );
    }

    // A crash between mark-completed and schedule-next leaves a subject
    // with no open occurrence. Creation is idempotent, so walking every
    // subject is safe.
    let subjects = self.store.list_subjects().await.map_err(Error::store)?;
    for subject in &subjects {
      if let Err(error) = self.scheduler.ensure_scheduled(subject).await {
        tracing::error!(
          subject_id = %subject.subject_id,
          %error,
          "failed to re-derive schedule for subject"
        );
      }
    }
    tracing::info!(subjects = subjects.len(), "startup recovery complete");
    Ok(())
  }
}
