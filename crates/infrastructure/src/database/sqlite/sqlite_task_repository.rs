use async_trait::async_trait;
use chrono::Utc;
use jobcore_core::models::{ExtraAttrs, Task, TaskQuery, TaskStatus};
use jobcore_core::traits::TaskRepository;
use jobcore_core::{CoreError, CoreResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> CoreResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            vendor_type: row.try_get("vendor_type")?,
            job_id: row.try_get("job_id")?,
            status: row.try_get("status")?,
            status_code: row.try_get("status_code")?,
            status_revision: row.try_get("status_revision")?,
            status_message: row.try_get("status_message")?,
            run_count: row.try_get("run_count")?,
            extra_attrs: MappingHelpers::json_column(row, "extra_attrs")?,
            check_in_comment: row.try_get("check_in_comment")?,
            creation_time: row.try_get("creation_time")?,
            start_time: row.try_get("start_time")?,
            update_time: row.try_get("update_time")?,
            end_time: row.try_get("end_time")?,
        })
    }

    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, query: &'a TaskQuery) {
        if let Some(execution_id) = query.execution_id {
            builder.push(" AND execution_id = ").push_bind(execution_id);
        }
        if let Some(vendor_type) = &query.vendor_type {
            builder.push(" AND vendor_type = ").push_bind(vendor_type);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
    }

    async fn exists(&self, id: i64) -> CoreResult<bool> {
        let row = sqlx::query("SELECT id FROM task WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(execution_id = task.execution_id))]
    async fn create(&self, task: &Task) -> CoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO task (execution_id, vendor_type, job_id, status, status_code,
                status_revision, status_message, run_count, extra_attrs, check_in_comment,
                creation_time, start_time, update_time, end_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.execution_id)
        .bind(&task.vendor_type)
        .bind(&task.job_id)
        .bind(task.status)
        .bind(task.status.code())
        .bind(task.status_revision)
        .bind(&task.status_message)
        .bind(task.run_count)
        .bind(MappingHelpers::to_json(&task.extra_attrs)?)
        .bind(&task.check_in_comment)
        .bind(task.creation_time)
        .bind(task.start_time)
        .bind(task.update_time)
        .bind(task.end_time)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("创建任务: {}", id);
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> CoreResult<Task> {
        let row = sqlx::query("SELECT * FROM task WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Self::row_to_task(&row),
            None => Err(CoreError::not_found("task", id)),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &TaskQuery) -> CoreResult<Vec<Task>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM task WHERE 1 = 1");
        Self::push_filters(&mut builder, query);
        builder.push(" ORDER BY id");
        if let Some(page) = query.pagination {
            builder
                .push(" LIMIT ")
                .push_bind(page.page_size)
                .push(" OFFSET ")
                .push_bind(page.offset());
        }
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self))]
    async fn count(&self, query: &TaskQuery) -> CoreResult<i64> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM task WHERE 1 = 1");
        Self::push_filters(&mut builder, query);
        let row = builder.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("total")?)
    }

    #[instrument(skip(self))]
    async fn update_job_id(&self, id: i64, job_id: &str) -> CoreResult<()> {
        let result = sqlx::query("UPDATE task SET job_id = ?, update_time = ? WHERE id = ?")
            .bind(job_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("task", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: i64,
        status: TaskStatus,
        revision: i64,
        message: &str,
    ) -> CoreResult<bool> {
        let now = Utc::now();
        let start_time = (status == TaskStatus::Running).then_some(now);
        let end_time = status.is_final().then_some(now);
        let result = sqlx::query(
            r#"
            UPDATE task
            SET status = ?, status_code = ?, status_revision = ?, status_message = ?,
                update_time = ?,
                start_time = COALESCE(start_time, ?),
                end_time = COALESCE(?, end_time)
            WHERE id = ?
              AND (status_revision < ? OR (status_revision = ? AND status_code < ?))
            "#,
        )
        .bind(status)
        .bind(status.code())
        .bind(revision)
        .bind(message)
        .bind(now)
        .bind(start_time)
        .bind(end_time)
        .bind(id)
        .bind(revision)
        .bind(revision)
        .bind(status.code())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if !self.exists(id).await? {
            return Err(CoreError::not_found("task", id));
        }
        Ok(false)
    }

    #[instrument(skip(self, comment))]
    async fn update_check_in(&self, id: i64, comment: &str) -> CoreResult<()> {
        let result =
            sqlx::query("UPDATE task SET check_in_comment = ?, update_time = ? WHERE id = ?")
                .bind(comment)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("task", id));
        }
        Ok(())
    }

    #[instrument(skip(self, expected, new))]
    async fn compare_and_set_extra_attrs(
        &self,
        id: i64,
        expected: &ExtraAttrs,
        new: &ExtraAttrs,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE task SET extra_attrs = ?, update_time = ? WHERE id = ? AND extra_attrs = ?",
        )
        .bind(MappingHelpers::to_json(new)?)
        .bind(Utc::now())
        .bind(id)
        .bind(MappingHelpers::to_json(expected)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if !self.exists(id).await? {
            return Err(CoreError::not_found("task", id));
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::{test_pool, SqliteExecutionRepository};
    use jobcore_core::models::{Execution, Trigger};
    use jobcore_core::traits::ExecutionRepository;
    use serde_json::json;

    async fn setup() -> (SqliteTaskRepository, i64) {
        let pool = test_pool().await;
        let executions = SqliteExecutionRepository::new(pool.clone());
        let execution_id = executions
            .create(&Execution::new("RETENTION", 1, Trigger::Manual, ExtraAttrs::new()))
            .await
            .unwrap();
        (SqliteTaskRepository::new(pool), execution_id)
    }

    #[tokio::test]
    async fn test_stale_revision_is_dropped() {
        let (tasks, execution_id) = setup().await;
        let id = tasks
            .create(&Task::new(execution_id, "RETENTION", ExtraAttrs::new()))
            .await
            .unwrap();

        assert!(tasks.update_status(id, TaskStatus::Running, 5, "").await.unwrap());
        assert!(!tasks.update_status(id, TaskStatus::Error, 4, "late").await.unwrap());

        let stored = tasks.get(id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
        assert_eq!(stored.status_revision, 5);
        assert!(stored.start_time.is_some());
        assert!(stored.end_time.is_none());

        assert!(tasks.update_status(id, TaskStatus::Success, 6, "").await.unwrap());
        let stored = tasks.get(id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Success);
        assert_eq!(stored.status_code, 3);
        assert!(stored.end_time.is_some());
    }

    #[tokio::test]
    async fn test_same_revision_only_moves_forward() {
        let (tasks, execution_id) = setup().await;
        let id = tasks
            .create(&Task::new(execution_id, "RETENTION", ExtraAttrs::new()))
            .await
            .unwrap();

        assert!(tasks.update_status(id, TaskStatus::Scheduled, 0, "").await.unwrap());
        assert!(tasks.update_status(id, TaskStatus::Running, 0, "").await.unwrap());
        assert!(!tasks.update_status(id, TaskStatus::Pending, 0, "").await.unwrap());
        assert!(tasks.update_status(id, TaskStatus::Stopped, 0, "").await.unwrap());
        assert!(!tasks.update_status(id, TaskStatus::Success, 0, "").await.unwrap());
        assert_eq!(tasks.get(id).await.unwrap().status, TaskStatus::Stopped);

        assert!(tasks
            .update_status(999, TaskStatus::Running, 1, "")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_extra_attrs_compare_and_set() {
        let (tasks, execution_id) = setup().await;
        let mut attrs = ExtraAttrs::new();
        attrs.insert("repository".to_string(), json!("library/redis"));
        let id = tasks
            .create(&Task::new(execution_id, "RETENTION", attrs.clone()))
            .await
            .unwrap();

        let mut updated = attrs.clone();
        updated.insert("total".to_string(), json!(3));
        assert!(tasks.compare_and_set_extra_attrs(id, &attrs, &updated).await.unwrap());
        assert!(!tasks.compare_and_set_extra_attrs(id, &attrs, &updated).await.unwrap());
        assert_eq!(tasks.get(id).await.unwrap().extra_attrs["total"], json!(3));
    }

    #[tokio::test]
    async fn test_list_by_execution_and_status() {
        let (tasks, execution_id) = setup().await;
        for _ in 0..3 {
            tasks
                .create(&Task::new(execution_id, "RETENTION", ExtraAttrs::new()))
                .await
                .unwrap();
        }
        let query = TaskQuery::by_execution(execution_id);
        assert_eq!(tasks.count(&query).await.unwrap(), 3);
        let first = tasks.list(&query).await.unwrap()[0].id;
        tasks.update_job_id(first, "job-1").await.unwrap();
        tasks.update_check_in(first, "{\"total\":1}").await.unwrap();

        let pending = TaskQuery {
            status: Some(TaskStatus::Pending),
            ..TaskQuery::by_execution(execution_id)
        };
        assert_eq!(tasks.list(&pending).await.unwrap().len(), 3);
        let stored = tasks.get(first).await.unwrap();
        assert_eq!(stored.job_id.as_deref(), Some("job-1"));
        assert_eq!(stored.check_in_comment, "{\"total\":1}");
    }
}
