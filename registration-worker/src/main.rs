//! Consume queue data from Postgres and run it through the registration pipelines.
use std::sync::Arc;

use envconfig::Envconfig;
use tracing::error;

use registration_processor::memory::{
    InMemoryIdentityMappingStore, InMemoryObservationStore, InMemoryRecordStore, InMemoryRegistry,
};
use registration_processor::{PipelineRegistry, ProcessorContext};
use registration_worker::config::Config;
use registration_worker::error::WorkerError;
use registration_worker::metadata::MetadataSeed;
use registration_worker::metrics_server::{serve, setup_metrics_router};
use registration_worker::queue::PgQueue;
use registration_worker::worker::RegistrationWorker;

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env()?;

    let registry = match &config.metadata_path {
        Some(path) => MetadataSeed::load(path)?.into_registry(),
        None => InMemoryRegistry::new(),
    };
    let context = Arc::new(ProcessorContext::with_registry(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryIdentityMappingStore::new()),
        Arc::new(registry),
        Arc::new(InMemoryObservationStore::new()),
    ));
    let pipelines = Arc::new(PipelineRegistry::from_config(&config.processor, context));

    let queue = PgQueue::new(
        config.queue_table.as_str(),
        &config.database_url,
        config.max_pg_connections,
    )
    .await?;
    queue.migrate().await?;

    let worker = RegistrationWorker::from_config(&config, Arc::new(queue), pipelines);

    let router = setup_metrics_router()?;
    let bind = config.bind();
    tokio::task::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!("failed to serve metrics on {}: {}", bind, e);
        }
    });

    worker.run().await;

    Ok(())
}
