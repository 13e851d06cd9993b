//! The Herald worker: polls the store for due notifications, runs them
//! through the delivery pipeline, and keeps the schedule rolling.
//!
//! The binary (`herald`) wires a SQLite store, the scheduling service, the
//! HTTP delivery pipeline, and two loops: the delivery poller and the
//! stale-claim sweep.

pub mod config;
pub mod error;
pub mod poller;
pub mod recovery;

pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use poller::Worker;
pub use recovery::Recovery;

use std::sync::Arc;

use herald_core::{
  bus::{EventBus, EventHandler, HandlerFuture},
  events::{DomainEvent, EventKind},
  schedule::Scheduler,
  store::NotificationStore,
};

/// Build the event bus with the scheduler subscribed to every subject
/// event. Embedding applications publish their subject lifecycle events
/// into the returned bus.
pub fn wire_bus<S>(scheduler: Arc<Scheduler<S>>) -> EventBus
where
  S: NotificationStore + 'static,
{
  let mut bus = EventBus::new();
  for kind in EventKind::ALL {
    bus.subscribe(kind, Box::new(SchedulerHandle(scheduler.clone())));
  }
  bus
}

/// Shared-ownership adapter so one scheduler can back every subscription.
struct SchedulerHandle<S>(Arc<Scheduler<S>>);

impl<S> EventHandler for SchedulerHandle<S>
where
  S: NotificationStore + 'static,
{
  fn name(&self) -> &'static str { "scheduler" }

  fn handle<'a>(&'a self, event: &'a DomainEvent) -> HandlerFuture<'a> {
    self.0.handle(event)
  }
}

#[cfg(test)]
mod tests;
