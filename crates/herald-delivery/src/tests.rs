//! Pipeline tests against a scripted in-memory transport.

use std::{
  collections::VecDeque,
  sync::{
    Mutex,
    atomic::{AtomicU32, Ordering},
  },
};

use chrono::Utc;
use herald_core::notification::{
  ClaimedWork, DeliveryPayload, NotificationKind,
};
use uuid::Uuid;

use crate::{
  AttemptError, BreakerConfig, CircuitBreaker, CircuitState, DeliveryOutcome,
  DeliveryPipeline, RetryPolicy, Transport,
};

/// Replays a fixed sequence of attempt results, then succeeds.
struct Scripted {
  script: Mutex<VecDeque<Result<(), AttemptError>>>,
  calls:  AtomicU32,
}

impl Scripted {
  fn new(script: Vec<Result<(), AttemptError>>) -> Self {
    Self {
      script: Mutex::new(script.into()),
      calls:  AtomicU32::new(0),
    }
  }

  fn calls(&self) -> u32 { self.calls.load(Ordering::SeqCst) }
}

impl Transport for Scripted {
  fn deliver(
    &self,
    _work: &ClaimedWork,
  ) -> impl std::future::Future<Output = Result<(), AttemptError>> + Send + '_
  {
    async move {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
  }
}

fn work() -> ClaimedWork {
  let subject_id = Uuid::new_v4();
  let id = Uuid::new_v4();
  ClaimedWork {
    notification_id: id,
    kind:            NotificationKind::Birthday,
    idempotency_key: id,
    target_utc:      Utc::now(),
    payload:         DeliveryPayload {
      subject_id,
      message: "Hey, Alice Liddell it's your birthday".into(),
    },
  }
}

fn pipeline(transport: Scripted) -> DeliveryPipeline<Scripted> {
  DeliveryPipeline::new(
    transport,
    RetryPolicy::default(),
    CircuitBreaker::default(),
  )
}

#[tokio::test]
async fn first_attempt_success_needs_no_retry() {
  let p = pipeline(Scripted::new(vec![Ok(())]));
  assert_eq!(p.deliver(&work()).await, DeliveryOutcome::Delivered {
    retries: 0
  });
}

#[tokio::test(start_paused = true)]
async fn three_server_errors_then_success_uses_the_whole_budget() {
  let p = pipeline(Scripted::new(vec![
    Err(AttemptError::ServerError(500)),
    Err(AttemptError::ServerError(500)),
    Err(AttemptError::ServerError(500)),
    Ok(()),
  ]));

  assert_eq!(p.deliver(&work()).await, DeliveryOutcome::Delivered {
    retries: 3
  });
  assert_eq!(p.transport.calls(), 4);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
  let p = pipeline(Scripted::new(vec![Err(AttemptError::ClientError(422))]));

  let outcome = p.deliver(&work()).await;
  let DeliveryOutcome::Failed { retries, reason } = outcome else {
    panic!("expected failure, got {outcome:?}");
  };
  assert_eq!(retries, 0);
  assert!(reason.contains("422"));
  assert_eq!(p.transport.calls(), 1);
}

#[tokio::test]
async fn explicit_refusal_is_permanent() {
  let p = pipeline(Scripted::new(vec![Err(AttemptError::Refused(
    "unknown subject".into(),
  ))]));

  assert!(matches!(
    p.deliver(&work()).await,
    DeliveryOutcome::Failed { retries: 0, .. }
  ));
}

#[tokio::test(start_paused = true)]
async fn budget_exhaustion_fails_after_four_attempts() {
  let p = pipeline(Scripted::new(vec![
    Err(AttemptError::Timeout),
    Err(AttemptError::Timeout),
    Err(AttemptError::Timeout),
    Err(AttemptError::Timeout),
  ]));

  let outcome = p.deliver(&work()).await;
  let DeliveryOutcome::Failed { retries, reason } = outcome else {
    panic!("expected failure, got {outcome:?}");
  };
  assert_eq!(retries, 3);
  assert!(reason.contains("exhausted"));
  assert_eq!(p.transport.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn malformed_ack_counts_as_transient() {
  let p = pipeline(Scripted::new(vec![
    Err(AttemptError::MalformedAck("empty body".into())),
    Ok(()),
  ]));

  assert_eq!(p.deliver(&work()).await, DeliveryOutcome::Delivered {
    retries: 1
  });
}

#[tokio::test(start_paused = true)]
async fn open_circuit_skips_without_attempting() {
  // A tiny window-free breaker that opens on the first sample.
  let breaker = CircuitBreaker::new(BreakerConfig {
    min_samples: 1,
    ..BreakerConfig::default()
  });
  let p = DeliveryPipeline::new(
    Scripted::new(vec![Err(AttemptError::ServerError(500)); 8]),
    RetryPolicy::default(),
    breaker,
  );

  // The first delivery burns an attempt, fails, and opens the circuit.
  let first = p.deliver(&work()).await;
  assert!(matches!(first, DeliveryOutcome::Skipped));
  assert_eq!(p.breaker().state(), CircuitState::Open);
  let calls_after_first = p.transport.calls();
  assert_eq!(calls_after_first, 1);

  // Subsequent deliveries short-circuit without touching the transport.
  assert!(matches!(p.deliver(&work()).await, DeliveryOutcome::Skipped));
  assert_eq!(p.transport.calls(), calls_after_first);
}
