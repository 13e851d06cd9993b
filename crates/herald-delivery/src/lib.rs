//! Outbound delivery for claimed notifications.
//!
//! The pipeline wraps a [`Transport`] with retry-with-backoff and a rolling
//! circuit breaker. Failures are classified at the transport boundary:
//! transient ones (network, timeout, 5xx, unparsable acknowledgement) are
//! retried, permanent ones (4xx, explicit rejection) are not.

mod breaker;
mod pipeline;
mod retry;
mod transport;

pub mod error;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use error::{Error, Result};
pub use pipeline::{DeliveryOutcome, DeliveryPipeline};
pub use retry::RetryPolicy;
pub use transport::{
  AttemptError, DeliveryAck, HttpTransport, IDEMPOTENCY_HEADER, Transport,
};

#[cfg(test)]
mod tests;
