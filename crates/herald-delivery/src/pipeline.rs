//! The delivery pipeline: transport + retry policy + circuit breaker for
//! one claimed notification at a time.

use herald_core::notification::ClaimedWork;

use crate::{
  breaker::CircuitBreaker, retry::RetryPolicy, transport::Transport,
};

/// Terminal result of running one claimed notification through the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
  /// The endpoint acknowledged the delivery after `retries` retries.
  Delivered { retries: u32 },
  /// Delivery failed permanently (non-retryable error or budget
  /// exhausted).
  Failed { retries: u32, reason: String },
  /// The circuit is open; no verdict was reached. The notification stays
  /// claimed and the stale sweep will requeue it.
  Skipped,
}

pub struct DeliveryPipeline<T> {
  pub(crate) transport: T,
  policy:               RetryPolicy,
  breaker:              CircuitBreaker,
}

impl<T> DeliveryPipeline<T>
where
  T: Transport,
{
  pub fn new(transport: T, policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
    Self { transport, policy, breaker }
  }

  pub fn breaker(&self) -> &CircuitBreaker { &self.breaker }

  /// Attempt delivery until acknowledged, permanently failed, or out of
  /// budget. Sleeps the backoff delay between attempts.
  pub async fn deliver(&self, work: &ClaimedWork) -> DeliveryOutcome {
    let mut attempt = 0u32;
    loop {
      if !self.breaker.try_acquire() {
        tracing::warn!(
          notification_id = %work.notification_id,
          attempt,
          "circuit open; abandoning delivery for now"
        );
        return DeliveryOutcome::Skipped;
      }

      match self.transport.deliver(work).await {
        Ok(()) => {
          self.breaker.record_success();
          tracing::info!(
            notification_id = %work.notification_id,
            retries = attempt,
            "delivery acknowledged"
          );
          return DeliveryOutcome::Delivered { retries: attempt };
        }
        Err(error) => {
          self.breaker.record_failure();

          if !error.is_transient() {
            tracing::warn!(
              notification_id = %work.notification_id,
              %error,
              "permanent delivery failure"
            );
            return DeliveryOutcome::Failed {
              retries: attempt,
              reason:  error.to_string(),
            };
          }

          if attempt >= self.policy.max_retries {
            tracing::warn!(
              notification_id = %work.notification_id,
              attempts = self.policy.max_attempts(),
              %error,
              "retry budget exhausted"
            );
            return DeliveryOutcome::Failed {
              retries: attempt,
              reason:  format!(
                "retries exhausted after {} attempts: {error}",
                self.policy.max_attempts()
              ),
            };
          }

          let delay = self.policy.delay_after(attempt);
          tracing::debug!(
            notification_id = %work.notification_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            %error,
            "transient failure; backing off"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }
}
