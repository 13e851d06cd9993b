//! The delivery poller: claim a batch of due notifications, run them
//! through the pipeline with bounded parallelism, and record the verdicts.

use std::sync::Arc;

use chrono::Utc;
use herald_core::{
  notification::{ClaimedWork, Notification},
  schedule::Scheduler,
  store::NotificationStore,
};
use herald_delivery::{DeliveryOutcome, DeliveryPipeline, Transport};
use tokio::task::JoinSet;

use crate::{Error, Result};

pub struct Worker<S, T> {
  store:      Arc<S>,
  scheduler:  Arc<Scheduler<S>>,
  pipeline:   Arc<DeliveryPipeline<T>>,
  batch_size: u32,
}

impl<S, T> Worker<S, T>
where
  S: NotificationStore + 'static,
  T: Transport + 'static,
{
  pub fn new(
    store:      Arc<S>,
    scheduler:  Arc<Scheduler<S>>,
    pipeline:   DeliveryPipeline<T>,
    batch_size: u32,
  ) -> Self {
    Self { store, scheduler, pipeline: Arc::new(pipeline), batch_size }
  }

  /// One poll: claim due work, process every claim concurrently, await
  /// them all.
  ///
  /// The claim batch bounds the parallelism. Per-notification failures
  /// are logged and never abort siblings. Returns how many notifications
  /// were claimed.
  pub async fn tick(&self) -> Result<usize> {
    let claimed = self
      .store
      .claim_ready(Utc::now(), self.batch_size)
      .await
      .map_err(Error::store)?;

    if claimed.is_empty() {
      return Ok(0);
    }
    tracing::info!(count = claimed.len(), "claimed due notifications");

    let total = claimed.len();
    let mut tasks = JoinSet::new();
    for notification in claimed {
      let store = self.store.clone();
      let scheduler = self.scheduler.clone();
      let pipeline = self.pipeline.clone();
      tasks.spawn(async move {
        let id = notification.id;
        if let Err(error) =
          process(store, scheduler, pipeline, notification).await
        {
          tracing::error!(notification_id = %id, %error, "processing failed");
        }
      });
    }
    while tasks.join_next().await.is_some() {}

    Ok(total)
  }
}

async fn process<S, T>(
  store:        Arc<S>,
  scheduler:    Arc<Scheduler<S>>,
  pipeline:     Arc<DeliveryPipeline<T>>,
  notification: Notification,
) -> Result<()>
where
  S: NotificationStore,
  T: Transport,
{
  let work = ClaimedWork::from(&notification);

  match pipeline.deliver(&work).await {
    DeliveryOutcome::Delivered { retries } => {
      let completed = notification.mark_completed(Utc::now(), retries)?;
      store
        .update(&completed, notification.version)
        .await
        .map_err(Error::store)?;

      // The next cycle is scheduled only after completion lands, so a
      // crash between the two leaves at most a missing next cycle —
      // never a duplicate delivery. The recovery pass fills the gap.
      if let Err(error) = scheduler.schedule_following(&completed).await {
        tracing::error!(
          notification_id = %completed.id,
          %error,
          "delivered, but scheduling the next cycle failed"
        );
      }
    }
    DeliveryOutcome::Failed { retries, reason } => {
      let failed = notification.mark_failed(reason, retries)?;
      store
        .update(&failed, notification.version)
        .await
        .map_err(Error::store)?;
    }
    // Circuit open: leave the row in processing. The stale sweep
    // requeues it once the claim ages out.
    DeliveryOutcome::Skipped => {}
  }
  Ok(())
}
