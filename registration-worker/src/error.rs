use thiserror::Error;

/// Errors from the queue storage.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("migration failed with: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

/// Errors that stop the worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("a queue error occurred while handling queue data {id}")]
    QueueError {
        id: String,
        #[source]
        error: QueueError,
    },
    #[error("failed to set up the queue: {0}")]
    SetupError(#[from] QueueError),
    #[error("invalid configuration: {0}")]
    ConfigError(#[from] envconfig::Error),
    #[error("failed to install metrics recorder: {0}")]
    MetricsError(#[from] metrics_exporter_prometheus::BuildError),
    #[error("failed to load metadata from {path}: {reason}")]
    MetadataError { path: String, reason: String },
}
