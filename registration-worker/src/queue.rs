//! Sources of queue data for the worker.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use registration_processor::QueueData;

use crate::error::QueueError;

pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Where queue data comes from and where its outcome is recorded.
#[async_trait]
pub trait QueueSource: Send + Sync {
    /// Claims the next available item for `worker`, if any.
    async fn dequeue(&self, worker: &str) -> QueueResult<Option<QueueData>>;

    async fn complete(&self, item: &QueueData) -> QueueResult<()>;

    /// Marks an item failed, keeping every error message reported for it.
    async fn fail(&self, item: &QueueData, errors: &[String]) -> QueueResult<()>;
}

/// Enumeration of possible statuses for queue data.
/// Available: waiting to be picked up by a worker.
/// Running: picked up by a worker and currently being processed.
/// Completed: processed successfully.
/// Failed: processing reported errors; they are stored alongside the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "queue_data_status")]
#[sqlx(rename_all = "lowercase")]
pub enum QueueDataStatus {
    Available,
    Running,
    Completed,
    Failed,
}

#[derive(sqlx::FromRow)]
struct QueueDataRow {
    uuid: String,
    discriminator: String,
    payload: String,
}

impl From<QueueDataRow> for QueueData {
    fn from(row: QueueDataRow) -> Self {
        QueueData {
            id: row.uuid,
            discriminator: row.discriminator,
            payload: row.payload,
        }
    }
}

/// A queue implemented on top of a PostgreSQL table.
pub struct PgQueue {
    table: String,
    pool: PgPool,
}

impl PgQueue {
    /// Initialize a new PgQueue backed by table in PostgreSQL.
    pub async fn new(table: &str, url: &str, max_connections: u32) -> QueueResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|error| QueueError::ConnectionError { error })?;

        Ok(Self::new_from_pool(table, pool))
    }

    pub fn new_from_pool(table: &str, pool: PgPool) -> Self {
        Self {
            table: table.to_owned(),
            pool,
        }
    }

    /// Creates the queue table and status type if they don't exist yet.
    pub async fn migrate(&self) -> QueueResult<()> {
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn enqueue(&self, item: &QueueData) -> QueueResult<()> {
        let query = format!(
            r#"
INSERT INTO "{0}"
    (uuid, discriminator, payload, status)
VALUES
    ($1, $2, $3, $4)
            "#,
            &self.table
        );

        sqlx::query(&query)
            .bind(&item.id)
            .bind(&item.discriminator)
            .bind(&item.payload)
            .bind(QueueDataStatus::Available)
            .execute(&self.pool)
            .await
            .map_err(|error| QueueError::QueryError {
                command: "INSERT".to_owned(),
                error,
            })?;

        Ok(())
    }

    async fn finish(
        &self,
        item: &QueueData,
        status: QueueDataStatus,
        errors: Option<Json<&[String]>>,
    ) -> QueueResult<()> {
        let query = format!(
            r#"
UPDATE
    "{0}"
SET
    status = $2,
    errors = $3,
    finished_at = NOW()
WHERE
    uuid = $1
            "#,
            &self.table
        );

        sqlx::query(&query)
            .bind(&item.id)
            .bind(status)
            .bind(errors)
            .execute(&self.pool)
            .await
            .map_err(|error| QueueError::QueryError {
                command: "UPDATE".to_owned(),
                error,
            })?;

        Ok(())
    }
}

#[async_trait]
impl QueueSource for PgQueue {
    async fn dequeue(&self, worker: &str) -> QueueResult<Option<QueueData>> {
        let query = format!(
            r#"
WITH available_in_queue AS (
    SELECT
        id
    FROM
        "{0}"
    WHERE
        status = 'available'
    ORDER BY
        id
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
UPDATE
    "{0}"
SET
    started_at = NOW(),
    status = 'running'::queue_data_status,
    attempted_by = $1
FROM
    available_in_queue
WHERE
    "{0}".id = available_in_queue.id
RETURNING
    "{0}".uuid, "{0}".discriminator, "{0}".payload
            "#,
            &self.table
        );

        let row: Option<QueueDataRow> = sqlx::query_as(&query)
            .bind(worker)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| QueueError::QueryError {
                command: "UPDATE".to_owned(),
                error,
            })?;

        Ok(row.map(QueueData::from))
    }

    async fn complete(&self, item: &QueueData) -> QueueResult<()> {
        self.finish(item, QueueDataStatus::Completed, None).await
    }

    async fn fail(&self, item: &QueueData, errors: &[String]) -> QueueResult<()> {
        self.finish(item, QueueDataStatus::Failed, Some(Json(errors)))
            .await
    }
}

/// A queue held in memory, recording what happened to every item it handed out.
#[derive(Default)]
pub struct InMemoryQueue {
    available: Mutex<VecDeque<QueueData>>,
    completed: Mutex<Vec<QueueData>>,
    failed: Mutex<Vec<(QueueData, Vec<String>)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl InMemoryQueue {
    pub fn new(items: impl IntoIterator<Item = QueueData>) -> Self {
        Self {
            available: Mutex::new(items.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn push(&self, item: QueueData) {
        lock(&self.available).push_back(item);
    }

    pub fn available(&self) -> usize {
        lock(&self.available).len()
    }

    pub fn completed(&self) -> Vec<QueueData> {
        lock(&self.completed).clone()
    }

    pub fn failed(&self) -> Vec<(QueueData, Vec<String>)> {
        lock(&self.failed).clone()
    }
}

#[async_trait]
impl QueueSource for InMemoryQueue {
    async fn dequeue(&self, _worker: &str) -> QueueResult<Option<QueueData>> {
        Ok(lock(&self.available).pop_front())
    }

    async fn complete(&self, item: &QueueData) -> QueueResult<()> {
        lock(&self.completed).push(item.clone());
        Ok(())
    }

    async fn fail(&self, item: &QueueData, errors: &[String]) -> QueueResult<()> {
        lock(&self.failed).push((item.clone(), errors.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_queue_is_fifo() {
        let queue = InMemoryQueue::new([
            QueueData::new("a", "json-registration", "{}"),
            QueueData::new("b", "json-registration", "{}"),
        ]);

        assert_eq!(queue.dequeue("w").await.unwrap().map(|i| i.id), Some("a".to_owned()));
        assert_eq!(queue.dequeue("w").await.unwrap().map(|i| i.id), Some("b".to_owned()));
        assert!(queue.dequeue("w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_queue_records_outcomes() {
        let queue = InMemoryQueue::default();
        let done = QueueData::new("a", "json-registration", "{}");
        let broken = QueueData::new("b", "json-registration", "[]");

        queue.complete(&done).await.unwrap();
        queue
            .fail(&broken, &["bad payload".to_owned()])
            .await
            .unwrap();

        assert_eq!(queue.completed(), vec![done]);
        assert_eq!(queue.failed(), vec![(broken, vec!["bad payload".to_owned()])]);
    }

    async fn stored_state(
        db: &PgPool,
        uuid: &str,
    ) -> (QueueDataStatus, Option<String>, Option<Json<Vec<String>>>, bool) {
        sqlx::query_as(
            "SELECT status, attempted_by, errors, finished_at IS NOT NULL FROM queue_data WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_one(db)
        .await
        .expect("failed to read queue data")
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_pg_dequeue_claims_oldest_available_item(db: PgPool) {
        let queue = PgQueue::new_from_pool("queue_data", db.clone());
        let first = QueueData::new("a", "json-registration", r#"{"patient":{}}"#);
        let second = QueueData::new("b", "json-demographics-update", "{}");
        queue.enqueue(&first).await.expect("failed to enqueue");
        queue.enqueue(&second).await.expect("failed to enqueue");

        let claimed = queue
            .dequeue("worker-1")
            .await
            .expect("failed to dequeue")
            .expect("queue should not be empty");
        assert_eq!(claimed, first);

        let (status, attempted_by, errors, finished) = stored_state(&db, "a").await;
        assert_eq!(status, QueueDataStatus::Running);
        assert_eq!(attempted_by.as_deref(), Some("worker-1"));
        assert!(errors.is_none());
        assert!(!finished);

        let (status, attempted_by, _, _) = stored_state(&db, "b").await;
        assert_eq!(status, QueueDataStatus::Available);
        assert!(attempted_by.is_none());

        assert_eq!(
            queue.dequeue("worker-2").await.expect("failed to dequeue"),
            Some(second)
        );
        assert!(queue
            .dequeue("worker-1")
            .await
            .expect("failed to dequeue")
            .is_none());
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_pg_complete_marks_item_completed(db: PgPool) {
        let queue = PgQueue::new_from_pool("queue_data", db.clone());
        queue
            .enqueue(&QueueData::new("a", "json-registration", "{}"))
            .await
            .expect("failed to enqueue");
        let item = queue
            .dequeue("worker-1")
            .await
            .expect("failed to dequeue")
            .expect("queue should not be empty");

        queue.complete(&item).await.expect("failed to complete");

        let (status, _, errors, finished) = stored_state(&db, "a").await;
        assert_eq!(status, QueueDataStatus::Completed);
        assert!(errors.is_none());
        assert!(finished);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_pg_fail_stores_every_error(db: PgPool) {
        let queue = PgQueue::new_from_pool("queue_data", db.clone());
        queue
            .enqueue(&QueueData::new("a", "json-registration", "{}"))
            .await
            .expect("failed to enqueue");
        let item = queue
            .dequeue("worker-1")
            .await
            .expect("failed to dequeue")
            .expect("queue should not be empty");
        let messages = vec![
            "Unable to find identifier type with name: Old ID".to_owned(),
            "Change of Birth Date requires manual review".to_owned(),
        ];

        queue.fail(&item, &messages).await.expect("failed to fail");

        let (status, _, errors, finished) = stored_state(&db, "a").await;
        assert_eq!(status, QueueDataStatus::Failed);
        assert_eq!(errors.map(|Json(errors)| errors), Some(messages));
        assert!(finished);
        assert!(queue
            .dequeue("worker-2")
            .await
            .expect("failed to dequeue")
            .is_none());
    }
}
