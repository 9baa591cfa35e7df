use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use pdfvault_core::models::{Task, TaskStatus, TaskType};

/// Channel notified when a new task is created, so workers wake immediately
/// instead of waiting for the next poll.
pub const TASK_NOTIFY_CHANNEL: &str = "pdfvault_new_task";

const TASK_COLUMNS: &str = r#"
    id, task_type, status, priority, payload, result, scheduled_at,
    started_at, completed_at, retry_count, max_retries, timeout_seconds,
    created_at, updated_at
"#;

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new task and notify workers in the same transaction.
    #[tracing::instrument(skip(self, payload))]
    pub async fn create_task(
        &self,
        task_type: TaskType,
        payload: serde_json::Value,
        priority: i32,
        scheduled_at: Option<DateTime<Utc>>,
        max_retries: Option<i32>,
        timeout_seconds: Option<i32>,
    ) -> Result<Task> {
        let scheduled_at = scheduled_at.unwrap_or_else(Utc::now);
        let max_retries = max_retries.unwrap_or(3);
        let status = if scheduled_at > Utc::now() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Pending
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for task creation")?;

        let task: Task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            INSERT INTO tasks (task_type, status, priority, payload, scheduled_at, max_retries, timeout_seconds)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_type.to_string())
        .bind(status)
        .bind(priority)
        .bind(payload)
        .bind(scheduled_at)
        .bind(max_retries)
        .bind(timeout_seconds)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert task into database")?;

        // Non-fatal: workers fall back to polling when NOTIFY fails.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(TASK_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                task_id = %task.id,
                "Failed to send pg_notify for new task, workers will discover it via polling"
            );
        }

        tx.commit()
            .await
            .context("Failed to commit task creation transaction")?;

        tracing::info!(
            task_id = %task.id,
            task_type = %task_type,
            priority = priority,
            "Task created"
        );

        Ok(task)
    }

    /// Atomically claim the next runnable task.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never claim the
    /// same row, then flips it to `running` before committing.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next_task(&self) -> Result<Option<Task>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let task: Option<Task> = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE status IN ('pending', 'scheduled')
                AND scheduled_at <= NOW()
            ORDER BY priority DESC, scheduled_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch next task")?;

        let Some(task) = task else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let claimed: Task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'running', started_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to mark task as running")?;

        tx.commit().await.context("Failed to commit task claim")?;

        Ok(Some(claimed))
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch task")?;

        Ok(task)
    }

    pub async fn update_status(&self, task_id: Uuid, status: TaskStatus) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(task_id)
            .bind(status)
            .execute(&self.pool)
            .await
            .context("Failed to update task status")?;

        Ok(())
    }

    pub async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'completed', result = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(result)
        .execute(&self.pool)
        .await
        .context("Failed to mark task as completed")?;

        Ok(())
    }

    pub async fn mark_failed(&self, task_id: Uuid, result: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed', result = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(result)
        .execute(&self.pool)
        .await
        .context("Failed to mark task as failed")?;

        Ok(())
    }

    /// Bump the retry counter and push the task out by `backoff_seconds`.
    pub async fn increment_retry(&self, task_id: Uuid, backoff_seconds: i64) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET retry_count = retry_count + 1,
                scheduled_at = NOW() + make_interval(secs => $2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(backoff_seconds as f64)
        .fetch_one(&self.pool)
        .await
        .context("Failed to increment task retry count")?;

        Ok(task)
    }

    /// Requeue `running` tasks whose worker died: anything running past its
    /// timeout plus the grace period goes back to `pending`.
    pub async fn reap_stale_running_tasks(&self, grace_period_secs: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending', updated_at = NOW()
            WHERE status = 'running'
                AND started_at IS NOT NULL
                AND started_at + make_interval(secs => (COALESCE(timeout_seconds, 3600) + $1)::float8) < NOW()
            "#,
        )
        .bind(grace_period_secs)
        .execute(&self.pool)
        .await
        .context("Failed to reap stale running tasks")?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(reaped = reaped, "Requeued stale running tasks");
        }

        Ok(reaped)
    }
}
