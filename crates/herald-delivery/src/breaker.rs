//! Rolling-window circuit breaker for the delivery endpoint.
//!
//! Tracks attempt outcomes in a sliding time window. When enough samples
//! accumulate and at least half of them failed, the circuit opens and
//! deliveries stop. After a cooldown one probe is allowed through: success
//! closes the circuit, failure reopens it for another cooldown.
//!
//! Methods take an explicit `Instant` so tests can drive the clock; the
//! `*_at`-less wrappers read the real clock.

use std::{
  collections::VecDeque,
  sync::Mutex,
  time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
  Closed,
  Open,
  HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
  /// Width of the rolling outcome window.
  pub window:            Duration,
  /// Outcomes required in the window before the failure rate is trusted.
  pub min_samples:       usize,
  /// Failure rate at or above which the circuit opens.
  pub failure_threshold: f64,
  /// How long the circuit stays open before admitting a probe.
  pub cooldown:          Duration,
}

impl Default for BreakerConfig {
  fn default() -> Self {
    Self {
      window:            Duration::from_secs(10),
      min_samples:       5,
      failure_threshold: 0.5,
      cooldown:          Duration::from_secs(30),
    }
  }
}

struct Inner {
  state:           CircuitState,
  /// `(when, failed)` outcomes, oldest first.
  samples:         VecDeque<(Instant, bool)>,
  opened_at:       Option<Instant>,
  probe_in_flight: bool,
}

pub struct CircuitBreaker {
  config: BreakerConfig,
  inner:  Mutex<Inner>,
}

impl CircuitBreaker {
  pub fn new(config: BreakerConfig) -> Self {
    Self {
      config,
      inner: Mutex::new(Inner {
        state:           CircuitState::Closed,
        samples:         VecDeque::new(),
        opened_at:       None,
        probe_in_flight: false,
      }),
    }
  }

  pub fn state(&self) -> CircuitState { self.inner.lock().unwrap().state }

  /// Ask permission for one delivery attempt.
  pub fn try_acquire(&self) -> bool { self.try_acquire_at(Instant::now()) }

  pub fn try_acquire_at(&self, now: Instant) -> bool {
    let mut inner = self.inner.lock().unwrap();
    match inner.state {
      CircuitState::Closed => true,
      CircuitState::Open => {
        let elapsed = inner
          .opened_at
          .map(|at| now.duration_since(at))
          .unwrap_or_default();
        if elapsed >= self.config.cooldown {
          tracing::info!("circuit cooldown elapsed; admitting probe");
          inner.state = CircuitState::HalfOpen;
          inner.probe_in_flight = true;
          true
        } else {
          false
        }
      }
      // One probe at a time while half-open.
      CircuitState::HalfOpen => {
        if inner.probe_in_flight {
          false
        } else {
          inner.probe_in_flight = true;
          true
        }
      }
    }
  }

  pub fn record_success(&self) { self.record_success_at(Instant::now()) }

  pub fn record_success_at(&self, now: Instant) {
    let mut inner = self.inner.lock().unwrap();
    match inner.state {
      CircuitState::HalfOpen => {
        tracing::info!("probe succeeded; closing circuit");
        inner.state = CircuitState::Closed;
        inner.samples.clear();
        inner.opened_at = None;
        inner.probe_in_flight = false;
      }
      _ => {
        inner.samples.push_back((now, false));
        self.prune(&mut inner, now);
      }
    }
  }

  pub fn record_failure(&self) { self.record_failure_at(Instant::now()) }

  pub fn record_failure_at(&self, now: Instant) {
    let mut inner = self.inner.lock().unwrap();
    match inner.state {
      CircuitState::HalfOpen => {
        tracing::warn!("probe failed; reopening circuit");
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.probe_in_flight = false;
      }
      _ => {
        inner.samples.push_back((now, true));
        self.prune(&mut inner, now);
        let total = inner.samples.len();
        if total < self.config.min_samples {
          return;
        }
        let failures =
          inner.samples.iter().filter(|(_, failed)| *failed).count();
        let rate = failures as f64 / total as f64;
        if rate >= self.config.failure_threshold {
          tracing::warn!(
            failures,
            total,
            "failure rate over threshold; opening circuit"
          );
          inner.state = CircuitState::Open;
          inner.opened_at = Some(now);
        }
      }
    }
  }

  fn prune(&self, inner: &mut Inner, now: Instant) {
    while let Some(&(at, _)) = inner.samples.front() {
      if now.duration_since(at) > self.config.window {
        inner.samples.pop_front();
      } else {
        break;
      }
    }
  }
}

impl Default for CircuitBreaker {
  fn default() -> Self { Self::new(BreakerConfig::default()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn breaker() -> CircuitBreaker { CircuitBreaker::default() }

  #[test]
  fn stays_closed_below_minimum_samples() {
    let b = breaker();
    let t = Instant::now();
    for _ in 0..4 {
      b.record_failure_at(t);
    }
    // 4 failures out of 4, but under min_samples.
    assert_eq!(b.state(), CircuitState::Closed);
    assert!(b.try_acquire_at(t));
  }

  #[test]
  fn opens_at_half_failures_with_enough_samples() {
    let b = breaker();
    let t = Instant::now();
    for _ in 0..3 {
      b.record_success_at(t);
    }
    for _ in 0..2 {
      b.record_failure_at(t);
    }
    assert_eq!(b.state(), CircuitState::Closed); // 2/5 < 0.5

    b.record_failure_at(t); // 3/6 = 0.5
    assert_eq!(b.state(), CircuitState::Open);
    assert!(!b.try_acquire_at(t));
  }

  #[test]
  fn outcomes_age_out_of_the_window() {
    let b = breaker();
    let t = Instant::now();
    for _ in 0..4 {
      b.record_failure_at(t);
    }
    // Window has rolled past the early failures by the time these land.
    let later = t + Duration::from_secs(11);
    for _ in 0..2 {
      b.record_failure_at(later);
    }
    // Only 2 samples remain in the window, under the minimum.
    assert_eq!(b.state(), CircuitState::Closed);
  }

  #[test]
  fn cooldown_admits_single_probe() {
    let b = breaker();
    let t = Instant::now();
    for _ in 0..5 {
      b.record_failure_at(t);
    }
    assert_eq!(b.state(), CircuitState::Open);
    assert!(!b.try_acquire_at(t + Duration::from_secs(29)));

    let after = t + Duration::from_secs(30);
    assert!(b.try_acquire_at(after));
    assert_eq!(b.state(), CircuitState::HalfOpen);
    // Second caller waits for the probe's verdict.
    assert!(!b.try_acquire_at(after));
  }

  #[test]
  fn probe_success_closes_probe_failure_reopens() {
    let b = breaker();
    let t = Instant::now();
    for _ in 0..5 {
      b.record_failure_at(t);
    }
    let after = t + Duration::from_secs(30);

    assert!(b.try_acquire_at(after));
    b.record_failure_at(after);
    assert_eq!(b.state(), CircuitState::Open);
    // A fresh cooldown starts from the failed probe.
    assert!(!b.try_acquire_at(after + Duration::from_secs(29)));

    let again = after + Duration::from_secs(30);
    assert!(b.try_acquire_at(again));
    b.record_success_at(again);
    assert_eq!(b.state(), CircuitState::Closed);
    assert!(b.try_acquire_at(again));
  }
}
