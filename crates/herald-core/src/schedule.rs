//! The scheduling service — turns subject events and completed deliveries
//! into notification rows.
//!
//! This is the only place that derives `target_utc` from
//! `(target_local, timezone)`, keeping the two-fields-move-together
//! invariant in one spot.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  bus::{EventHandler, HandlerFuture},
  events::{
    DomainEvent, SubjectAnchorChanged, SubjectCreated, SubjectDeleted,
    SubjectTimezoneChanged,
  },
  notification::{Notification, NotificationKind, NotificationStatus},
  occurrence::StrategyRegistry,
  store::NotificationStore,
  subject::SubjectSnapshot,
  timezone,
};

/// Creates, reschedules, and deletes notifications in response to domain
/// events; also schedules the next cycle after a completed delivery.
///
/// Generic over the store so tests can run it against an in-memory backend.
pub struct Scheduler<S> {
  store:    Arc<S>,
  registry: Arc<StrategyRegistry>,
}

impl<S> Scheduler<S>
where
  S: NotificationStore,
{
  pub fn new(store: Arc<S>, registry: Arc<StrategyRegistry>) -> Self {
    Self { store, registry }
  }

  fn store_err(e: S::Error) -> Error { Error::Store(Box::new(e)) }

  /// Create the next occurrence of `kind` for `subject`, strictly after
  /// `reference`.
  ///
  /// Returns `None` when an equivalent non-terminal occurrence already
  /// exists — re-derivation is idempotent by design, so racing creators
  /// and recovery replays are harmless.
  pub async fn schedule_next(
    &self,
    subject:   &SubjectSnapshot,
    kind:      NotificationKind,
    reference: DateTime<Utc>,
  ) -> Result<Option<Notification>> {
    let strategy = self.registry.get(kind)?;
    let target_local = strategy.next_occurrence(subject, reference);
    let target_utc = timezone::to_utc(target_local, subject.timezone);
    let notification = Notification::pending(
      subject.subject_id,
      kind,
      target_local,
      subject.timezone,
      target_utc,
      strategy.payload(subject),
    );

    let inserted = self
      .store
      .create(&notification)
      .await
      .map_err(Self::store_err)?;
    if inserted {
      tracing::info!(
        notification_id = %notification.id,
        subject_id = %subject.subject_id,
        kind = kind.as_str(),
        target_utc = %target_utc,
        "scheduled occurrence"
      );
      Ok(Some(notification))
    } else {
      tracing::debug!(
        subject_id = %subject.subject_id,
        kind = kind.as_str(),
        "occurrence already scheduled; skipping"
      );
      Ok(None)
    }
  }

  /// Recompute the target of the subject's open occurrence of `kind`.
  ///
  /// Only `Pending` rows are rewritten. An in-flight (`Processing`) row is
  /// logged and left alone; terminal rows are history. If the subject has
  /// no open occurrence at all, one is created.
  pub async fn reschedule_pending(
    &self,
    subject: &SubjectSnapshot,
    kind:    NotificationKind,
  ) -> Result<()> {
    let strategy = self.registry.get(kind)?;
    let notifications = self
      .store
      .find_by_subject(subject.subject_id)
      .await
      .map_err(Self::store_err)?;

    let open: Vec<&Notification> = notifications
      .iter()
      .filter(|n| n.kind == kind && !n.status.is_terminal())
      .collect();

    if open.is_empty() {
      self.schedule_next(subject, kind, Utc::now()).await?;
      return Ok(());
    }

    for notification in open {
      if notification.status != NotificationStatus::Pending {
        tracing::warn!(
          notification_id = %notification.id,
          status = ?notification.status,
          "occurrence is in flight; skipping reschedule"
        );
        continue;
      }

      let target_local = strategy.next_occurrence(subject, Utc::now());
      let target_utc = timezone::to_utc(target_local, subject.timezone);
      let rescheduled = notification.reschedule(
        target_local,
        subject.timezone,
        target_utc,
        strategy.payload(subject),
      )?;
      self
        .store
        .update(&rescheduled, notification.version)
        .await
        .map_err(Self::store_err)?;
      tracing::info!(
        notification_id = %notification.id,
        subject_id = %subject.subject_id,
        target_utc = %target_utc,
        "rescheduled occurrence"
      );
    }
    Ok(())
  }

  /// Schedule the cycle following a completed occurrence. Invoked by the
  /// worker after `mark_completed` lands.
  pub async fn schedule_following(
    &self,
    completed: &Notification,
  ) -> Result<Option<Notification>> {
    let Some(subject) = self
      .store
      .get_subject(completed.subject_id)
      .await
      .map_err(Self::store_err)?
    else {
      // Subject deleted between claim and completion; nothing to schedule.
      tracing::warn!(
        subject_id = %completed.subject_id,
        "no subject snapshot for completed occurrence"
      );
      return Ok(None);
    };
    self
      .schedule_next(&subject, completed.kind, completed.target_utc)
      .await
  }

  /// Make sure `subject` has an open occurrence of every registered kind.
  ///
  /// Used by the recovery pass to close the window where a worker died
  /// after completing a delivery but before scheduling the next cycle.
  pub async fn ensure_scheduled(&self, subject: &SubjectSnapshot) -> Result<()> {
    for kind in self.registry.kinds() {
      self.schedule_next(subject, kind, Utc::now()).await?;
    }
    Ok(())
  }

  // ── Event reactions ───────────────────────────────────────────────────

  async fn on_subject_created(&self, event: &SubjectCreated) -> Result<()> {
    let snapshot = SubjectSnapshot {
      subject_id: event.subject_id,
      first_name: event.first_name.clone(),
      last_name:  event.last_name.clone(),
      anchor:     event.anchor,
      timezone:   event.timezone,
      updated_at: event.occurred_at,
    };
    self
      .store
      .upsert_subject(&snapshot)
      .await
      .map_err(Self::store_err)?;
    for kind in self.registry.kinds() {
      self.schedule_next(&snapshot, kind, event.occurred_at).await?;
    }
    Ok(())
  }

  async fn on_anchor_changed(&self, event: &SubjectAnchorChanged) -> Result<()> {
    let mut snapshot = self
      .store
      .get_subject(event.subject_id)
      .await
      .map_err(Self::store_err)?
      .ok_or(Error::SubjectNotFound(event.subject_id))?;
    snapshot.anchor = event.new_anchor;
    snapshot.updated_at = event.occurred_at;
    self
      .store
      .upsert_subject(&snapshot)
      .await
      .map_err(Self::store_err)?;
    for kind in self.registry.kinds() {
      self.reschedule_pending(&snapshot, kind).await?;
    }
    Ok(())
  }

  async fn on_timezone_changed(
    &self,
    event: &SubjectTimezoneChanged,
  ) -> Result<()> {
    let mut snapshot = self
      .store
      .get_subject(event.subject_id)
      .await
      .map_err(Self::store_err)?
      .ok_or(Error::SubjectNotFound(event.subject_id))?;
    snapshot.timezone = event.new_timezone;
    snapshot.updated_at = event.occurred_at;
    self
      .store
      .upsert_subject(&snapshot)
      .await
      .map_err(Self::store_err)?;
    for kind in self.registry.kinds() {
      self.reschedule_pending(&snapshot, kind).await?;
    }
    Ok(())
  }

  async fn on_subject_deleted(&self, event: &SubjectDeleted) -> Result<()> {
    let removed = self
      .store
      .delete_by_subject(event.subject_id)
      .await
      .map_err(Self::store_err)?;
    self
      .store
      .delete_subject(event.subject_id)
      .await
      .map_err(Self::store_err)?;
    tracing::info!(
      subject_id = %event.subject_id,
      removed,
      "subject deleted; notifications cascaded"
    );
    Ok(())
  }
}

impl<S> EventHandler for Scheduler<S>
where
  S: NotificationStore + 'static,
{
  fn name(&self) -> &'static str { "scheduler" }

  fn handle<'a>(&'a self, event: &'a DomainEvent) -> HandlerFuture<'a> {
    Box::pin(async move {
      match event {
        DomainEvent::SubjectCreated(e) => self.on_subject_created(e).await,
        DomainEvent::SubjectAnchorChanged(e) => {
          self.on_anchor_changed(e).await
        }
        DomainEvent::SubjectTimezoneChanged(e) => {
          self.on_timezone_changed(e).await
        }
        DomainEvent::SubjectDeleted(e) => self.on_subject_deleted(e).await,
      }
    })
  }
}
