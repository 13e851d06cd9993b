//! In-process domain event bus.
//!
//! Handlers for one publish call run sequentially, in registration order —
//! never concurrently — so dependent side effects (audit-before-schedule)
//! cannot reorder. A failing handler is logged with full context and the
//! remaining handlers still run: partial delivery beats all-or-nothing here.
//!
//! The bus holds no durable queue. Events lost in a crash are acceptable
//! because scheduling state is always re-derivable from subject snapshots;
//! delivery correctness never depends on this bus. If durable fan-out is
//! ever needed, swap the implementation behind the same subscribe/publish
//! surface.

use std::{collections::HashMap, future::Future, pin::Pin};

use crate::{
  Result,
  events::{DomainEvent, EventKind},
};

/// Boxed future returned by event handlers.
pub type HandlerFuture<'a> =
  Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A subscriber on the bus.
pub trait EventHandler: Send + Sync {
  /// Short name used in failure logs.
  fn name(&self) -> &'static str;

  fn handle<'a>(&'a self, event: &'a DomainEvent) -> HandlerFuture<'a>;
}

/// Single-process publish/subscribe router.
///
/// Built once at startup and passed by reference; subscriptions are not
/// added while the process runs.
#[derive(Default)]
pub struct EventBus {
  handlers: HashMap<EventKind, Vec<Box<dyn EventHandler>>>,
}

impl EventBus {
  pub fn new() -> Self { Self::default() }

  /// Register `handler` for `kind`. Handlers fire in registration order.
  pub fn subscribe(&mut self, kind: EventKind, handler: Box<dyn EventHandler>) {
    self.handlers.entry(kind).or_default().push(handler);
  }

  /// Dispatch `event` to every handler registered for its kind.
  ///
  /// Handler errors are logged (event kind, subject id, handler position)
  /// and swallowed so later subscribers still run.
  pub async fn publish(&self, event: &DomainEvent) {
    let Some(handlers) = self.handlers.get(&event.kind()) else {
      tracing::debug!(kind = ?event.kind(), "no handlers registered for event");
      return;
    };

    for (position, handler) in handlers.iter().enumerate() {
      if let Err(error) = handler.handle(event).await {
        tracing::error!(
          kind = ?event.kind(),
          subject_id = %event.subject_id(),
          handler = handler.name(),
          position,
          %error,
          "event handler failed; continuing with remaining handlers"
        );
      }
    }
  }
}
