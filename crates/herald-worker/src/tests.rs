//! End-to-end worker tests: real SQLite store, scripted transport.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
};

use chrono::{Datelike, Duration, NaiveDate, Timelike, Utc};
use herald_core::{
  notification::{
    ClaimedWork, DeliveryPayload, Notification, NotificationKind,
    NotificationStatus,
  },
  occurrence::StrategyRegistry,
  schedule::Scheduler,
  store::NotificationStore,
  subject::SubjectSnapshot,
  events::{
    DomainEvent, SubjectAnchorChanged, SubjectCreated, SubjectDeleted,
    SubjectTimezoneChanged,
  },
};
use herald_delivery::{
  AttemptError, CircuitBreaker, DeliveryPipeline, RetryPolicy, Transport,
};
use herald_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{Recovery, Worker, wire_bus};

struct Scripted {
  script: Mutex<VecDeque<Result<(), AttemptError>>>,
}

impl Scripted {
  fn new(script: Vec<Result<(), AttemptError>>) -> Self {
    Self { script: Mutex::new(script.into()) }
  }

  fn ok() -> Self { Self::new(vec![]) }
}

impl Transport for Scripted {
  fn deliver(
    &self,
    _work: &ClaimedWork,
  ) -> impl std::future::Future<Output = Result<(), AttemptError>> + Send + '_
  {
    async move { self.script.lock().unwrap().pop_front().unwrap_or(Ok(())) }
  }
}

struct Harness {
  store:     Arc<SqliteStore>,
  scheduler: Arc<Scheduler<SqliteStore>>,
}

impl Harness {
  async fn new() -> Self {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let scheduler = Arc::new(Scheduler::new(
      store.clone(),
      Arc::new(StrategyRegistry::standard()),
    ));
    Self { store, scheduler }
  }

  fn worker(&self, transport: Scripted) -> Worker<SqliteStore, Scripted> {
    self.worker_with_breaker(transport, CircuitBreaker::default())
  }

  fn worker_with_breaker(
    &self,
    transport: Scripted,
    breaker:   CircuitBreaker,
  ) -> Worker<SqliteStore, Scripted> {
    Worker::new(
      self.store.clone(),
      self.scheduler.clone(),
      DeliveryPipeline::new(transport, RetryPolicy::default(), breaker),
      25,
    )
  }

  /// A subject snapshot plus one due notification, both persisted.
  async fn seed_due(&self) -> (SubjectSnapshot, Notification) {
    let subject = SubjectSnapshot {
      subject_id: Uuid::new_v4(),
      first_name: "Alice".into(),
      last_name:  "Liddell".into(),
      anchor:     NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
      timezone:   chrono_tz::America::New_York,
      updated_at: Utc::now(),
    };
    self.store.upsert_subject(&subject).await.unwrap();

    let target = Utc::now() - Duration::minutes(5);
    let notification = Notification::pending(
      subject.subject_id,
      NotificationKind::Birthday,
      target.naive_utc(),
      chrono_tz::UTC,
      target,
      DeliveryPayload {
        subject_id: subject.subject_id,
        message:    "Hey, Alice Liddell it's your birthday".into(),
      },
    );
    assert!(self.store.create(&notification).await.unwrap());
    (subject, notification)
  }
}

fn created_event(subject: &SubjectSnapshot) -> DomainEvent {
  DomainEvent::SubjectCreated(SubjectCreated {
    subject_id:  subject.subject_id,
    first_name:  subject.first_name.clone(),
    last_name:   subject.last_name.clone(),
    anchor:      subject.anchor,
    timezone:    subject.timezone,
    occurred_at: Utc::now(),
  })
}

// ─── Scheduling via the bus ──────────────────────────────────────────────────

#[tokio::test]
async fn subject_created_event_schedules_first_occurrence() {
  let h = Harness::new().await;
  let bus = wire_bus(h.scheduler.clone());

  let subject = SubjectSnapshot {
    subject_id: Uuid::new_v4(),
    first_name: "Alice".into(),
    last_name:  "Liddell".into(),
    anchor:     NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
    timezone:   chrono_tz::America::New_York,
    updated_at: Utc::now(),
  };
  bus.publish(&created_event(&subject)).await;

  let rows = h.store.find_by_subject(subject.subject_id).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].status, NotificationStatus::Pending);
  assert_eq!(rows[0].target_local.time().hour(), 9);
  assert!(rows[0].target_utc > Utc::now());

  // Replaying the event must not mint a second occurrence.
  bus.publish(&created_event(&subject)).await;
  assert_eq!(
    h.store.find_by_subject(subject.subject_id).await.unwrap().len(),
    1
  );
}

#[tokio::test]
async fn anchor_change_reschedules_pending_occurrence() {
  let h = Harness::new().await;
  let bus = wire_bus(h.scheduler.clone());

  let subject = SubjectSnapshot {
    subject_id: Uuid::new_v4(),
    first_name: "Alice".into(),
    last_name:  "Liddell".into(),
    anchor:     NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
    timezone:   chrono_tz::America::New_York,
    updated_at: Utc::now(),
  };
  bus.publish(&created_event(&subject)).await;
  let before = h.store.find_by_subject(subject.subject_id).await.unwrap()[0]
    .clone();

  let new_anchor = NaiveDate::from_ymd_opt(1990, 7, 4).unwrap();
  bus
    .publish(&DomainEvent::SubjectAnchorChanged(SubjectAnchorChanged {
      subject_id:  subject.subject_id,
      old_anchor:  subject.anchor,
      new_anchor,
      timezone:    subject.timezone,
      occurred_at: Utc::now(),
    }))
    .await;

  let after = h.store.find_by_subject(subject.subject_id).await.unwrap();
  assert_eq!(after.len(), 1);
  let after = &after[0];
  // Same entity, new target, bumped version.
  assert_eq!(after.id, before.id);
  assert_eq!(after.target_local.date().month(), 7);
  assert_eq!(after.target_local.date().day(), 4);
  assert_eq!(after.version, before.version + 1);
}

#[tokio::test]
async fn timezone_change_recomputes_instant_keeping_wall_clock() {
  let h = Harness::new().await;
  let bus = wire_bus(h.scheduler.clone());

  let subject = SubjectSnapshot {
    subject_id: Uuid::new_v4(),
    first_name: "Alice".into(),
    last_name:  "Liddell".into(),
    anchor:     NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
    timezone:   chrono_tz::America::New_York,
    updated_at: Utc::now(),
  };
  bus.publish(&created_event(&subject)).await;
  let before = h.store.find_by_subject(subject.subject_id).await.unwrap()[0]
    .clone();

  bus
    .publish(&DomainEvent::SubjectTimezoneChanged(SubjectTimezoneChanged {
      subject_id:   subject.subject_id,
      old_timezone: chrono_tz::America::New_York,
      new_timezone: chrono_tz::Asia::Tokyo,
      anchor:       subject.anchor,
      occurred_at:  Utc::now(),
    }))
    .await;

  let after = h.store.find_by_subject(subject.subject_id).await.unwrap();
  let after = &after[0];
  assert_eq!(after.timezone, chrono_tz::Asia::Tokyo);
  // Wall-clock intent preserved, instant shifted.
  assert_eq!(after.target_local.time(), before.target_local.time());
  assert_ne!(after.target_utc, before.target_utc);
}

#[tokio::test]
async fn subject_deleted_event_cascades() {
  let h = Harness::new().await;
  let bus = wire_bus(h.scheduler.clone());

  let (subject, _) = h.seed_due().await;
  bus
    .publish(&DomainEvent::SubjectDeleted(SubjectDeleted {
      subject_id:  subject.subject_id,
      occurred_at: Utc::now(),
    }))
    .await;

  assert!(h.store.find_by_subject(subject.subject_id).await.unwrap().is_empty());
  assert!(h.store.get_subject(subject.subject_id).await.unwrap().is_none());
}

// ─── Delivery ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tick_completes_due_notification_and_schedules_next_cycle() {
  let h = Harness::new().await;
  let (subject, notification) = h.seed_due().await;
  let worker = h.worker(Scripted::ok());

  assert_eq!(worker.tick().await.unwrap(), 1);

  let rows = h.store.find_by_subject(subject.subject_id).await.unwrap();
  assert_eq!(rows.len(), 2);

  let done = rows.iter().find(|n| n.id == notification.id).unwrap();
  assert_eq!(done.status, NotificationStatus::Completed);
  assert!(done.executed_at.is_some());
  assert_eq!(done.retry_count, 0);

  let next = rows.iter().find(|n| n.id != notification.id).unwrap();
  assert_eq!(next.status, NotificationStatus::Pending);
  assert!(next.target_utc > Utc::now());
}

#[tokio::test]
async fn tick_marks_permanent_failure_without_next_cycle() {
  let h = Harness::new().await;
  let (subject, notification) = h.seed_due().await;
  let worker =
    h.worker(Scripted::new(vec![Err(AttemptError::ClientError(410))]));

  worker.tick().await.unwrap();

  let rows = h.store.find_by_subject(subject.subject_id).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].id, notification.id);
  assert_eq!(rows[0].status, NotificationStatus::Failed);
  assert!(rows[0].last_failure.as_deref().unwrap().contains("410"));
}

#[tokio::test]
async fn tick_with_nothing_due_claims_nothing() {
  let h = Harness::new().await;
  let worker = h.worker(Scripted::ok());
  assert_eq!(worker.tick().await.unwrap(), 0);
}

#[tokio::test]
async fn open_circuit_leaves_claim_for_the_sweep() {
  let h = Harness::new().await;
  let (subject, notification) = h.seed_due().await;

  // Pre-opened breaker: no attempt is made, no verdict reached.
  let breaker = CircuitBreaker::default();
  for _ in 0..5 {
    breaker.record_failure();
  }
  let worker = h.worker_with_breaker(Scripted::ok(), breaker);
  worker.tick().await.unwrap();

  let rows = h.store.find_by_subject(subject.subject_id).await.unwrap();
  assert_eq!(rows[0].status, NotificationStatus::Processing);

  // The sweep returns the abandoned claim to pending.
  let recovery = Recovery::new(
    h.store.clone(),
    h.scheduler.clone(),
    Duration::seconds(-5),
  );
  assert_eq!(recovery.sweep().await.unwrap(), 1);
  let recovered =
    h.store.find_by_id(notification.id).await.unwrap().unwrap();
  assert_eq!(recovered.status, NotificationStatus::Pending);
}

// ─── Recovery ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn startup_recovery_fills_missing_next_cycle() {
  let h = Harness::new().await;
  let (subject, notification) = h.seed_due().await;

  // Simulate a crash between completion and next-cycle scheduling.
  let claimed = notification.claim().unwrap();
  h.store.update(&claimed, notification.version).await.unwrap();
  let done = claimed.mark_completed(Utc::now(), 0).unwrap();
  h.store.update(&done, claimed.version).await.unwrap();
  assert_eq!(
    h.store.find_by_subject(subject.subject_id).await.unwrap().len(),
    1
  );

  let recovery = Recovery::new(
    h.store.clone(),
    h.scheduler.clone(),
    Duration::seconds(600),
  );
  recovery.startup().await.unwrap();

  let rows = h.store.find_by_subject(subject.subject_id).await.unwrap();
  assert_eq!(rows.len(), 2);
  assert!(
    rows
      .iter()
      .any(|n| n.status == NotificationStatus::Pending
        && n.target_utc > Utc::now())
  );
}
