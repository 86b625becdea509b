use std::sync::Arc;
use std::time;

use metrics::{counter, gauge};
use tokio::sync;
use tracing::{error, info};

use registration_processor::{PipelineRegistry, ProcessOutcome, QueueData};

use crate::config::Config;
use crate::error::WorkerError;
use crate::metrics_consts::{WORKER_ITEMS, WORKER_SATURATION};
use crate::queue::QueueSource;

/// A worker that polls a `QueueSource` and hands each item to the pipeline that accepts it.
pub struct RegistrationWorker<Q> {
    /// An identifier for this worker. Used to mark items we have claimed.
    name: String,
    /// The queue we will be dequeuing items from.
    queue: Arc<Q>,
    /// The pipelines items are dispatched to.
    pipelines: Arc<PipelineRegistry>,
    /// The interval for polling the queue.
    poll_interval: time::Duration,
    /// Maximum number of items being processed at once.
    max_concurrent_items: usize,
}

impl<Q: QueueSource + 'static> RegistrationWorker<Q> {
    pub fn new(
        name: &str,
        queue: Arc<Q>,
        pipelines: Arc<PipelineRegistry>,
        poll_interval: time::Duration,
        max_concurrent_items: usize,
    ) -> Self {
        Self {
            name: name.to_owned(),
            queue,
            pipelines,
            poll_interval,
            max_concurrent_items: max_concurrent_items.max(1),
        }
    }

    pub fn from_config(config: &Config, queue: Arc<Q>, pipelines: Arc<PipelineRegistry>) -> Self {
        Self::new(
            &config.worker_name,
            queue,
            pipelines,
            config.poll_interval.0,
            config.max_concurrent_items,
        )
    }

    /// Wait until an item becomes available in our queue.
    async fn wait_for_item(&self) -> QueueData {
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            interval.tick().await;

            match self.queue.dequeue(&self.name).await {
                Ok(Some(item)) => return item,
                Ok(None) => continue,
                Err(error) => {
                    error!("error while trying to dequeue queue data: {}", error);
                    continue;
                }
            }
        }
    }

    /// Run this worker to continuously process any items that become available.
    pub async fn run(&self) {
        let semaphore = Arc::new(sync::Semaphore::new(self.max_concurrent_items));
        let report_semaphore_utilization = || {
            gauge!(WORKER_SATURATION).set(
                1f64 - semaphore.available_permits() as f64 / self.max_concurrent_items as f64,
            );
        };

        info!(worker = self.name.as_str(), "starting registration worker");
        loop {
            report_semaphore_utilization();
            let item = self.wait_for_item().await;

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                error!("worker semaphore has been closed");
                return;
            };
            report_semaphore_utilization();

            let queue = self.queue.clone();
            let pipelines = self.pipelines.clone();
            tokio::spawn(async move {
                let result = process_queue_data(queue.as_ref(), &pipelines, item).await;
                drop(permit);
                if let Err(error) = result {
                    error!("failed to record queue data outcome: {}", error);
                }
            });
        }
    }

    /// Processes every item currently available, one after the other, and returns how many
    /// were handled.
    pub async fn drain(&self) -> Result<usize, WorkerError> {
        let mut handled = 0;
        while let Some(item) = self.queue.dequeue(&self.name).await.map_err(|error| {
            WorkerError::QueueError {
                id: "<dequeue>".to_owned(),
                error,
            }
        })? {
            process_queue_data(self.queue.as_ref(), &self.pipelines, item).await?;
            handled += 1;
        }
        Ok(handled)
    }
}

/// Dispatches one item and records its outcome on the queue. Items that fail processing are
/// marked failed with every error message; only queue errors are returned.
pub async fn process_queue_data<Q: QueueSource + ?Sized>(
    queue: &Q,
    pipelines: &PipelineRegistry,
    item: QueueData,
) -> Result<Option<ProcessOutcome>, WorkerError> {
    let queue_error = |error| WorkerError::QueueError {
        id: item.id.clone(),
        error,
    };

    match pipelines.process(&item).await {
        Ok(outcome) => {
            queue.complete(&item).await.map_err(queue_error)?;
            counter!(WORKER_ITEMS, "status" => "completed").increment(1);
            Ok(Some(outcome))
        }
        Err(errors) => {
            queue
                .fail(&item, &errors.messages())
                .await
                .map_err(queue_error)?;
            counter!(WORKER_ITEMS, "status" => "failed").increment(1);
            Ok(None)
        }
    }
}
