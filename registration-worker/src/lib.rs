pub mod config;
pub mod error;
pub mod metadata;
pub mod metrics_consts;
pub mod metrics_server;
pub mod queue;
pub mod worker;

pub use config::Config;
pub use error::{QueueError, WorkerError};
pub use queue::{InMemoryQueue, PgQueue, QueueDataStatus, QueueResult, QueueSource};
pub use worker::{process_queue_data, RegistrationWorker};
