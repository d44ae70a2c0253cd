use async_trait::async_trait;
use chrono::Utc;
use jobcore_core::models::{
    Execution, ExecutionMetrics, ExecutionQuery, ExecutionStatus, ExtraAttrs, TaskStatus,
};
use jobcore_core::traits::ExecutionRepository;
use jobcore_core::{CoreError, CoreResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::database::mapping::MappingHelpers;

/// 乐观并发下汇总状态的最大重试次数
const REFRESH_RETRIES: usize = 5;

pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_execution(row: &SqliteRow) -> CoreResult<Execution> {
        Ok(Execution {
            id: row.try_get("id")?,
            vendor_type: row.try_get("vendor_type")?,
            vendor_id: row.try_get("vendor_id")?,
            status: row.try_get("status")?,
            status_message: row.try_get("status_message")?,
            trigger: row.try_get("trigger_type")?,
            extra_attrs: MappingHelpers::json_column(row, "extra_attrs")?,
            revision: row.try_get("revision")?,
            start_time: row.try_get("start_time")?,
            update_time: row.try_get("update_time")?,
            end_time: row.try_get("end_time")?,
            metrics: None,
        })
    }

    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, query: &'a ExecutionQuery) {
        if let Some(vendor_type) = &query.vendor_type {
            builder.push(" AND vendor_type = ").push_bind(vendor_type);
        }
        if let Some(vendor_id) = query.vendor_id {
            builder.push(" AND vendor_id = ").push_bind(vendor_id);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
    }

    async fn fetch(&self, id: i64) -> CoreResult<Execution> {
        let row = sqlx::query("SELECT * FROM execution WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Self::row_to_execution(&row),
            None => Err(CoreError::not_found("execution", id)),
        }
    }
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    #[instrument(skip(self, execution), fields(vendor_type = %execution.vendor_type, vendor_id = execution.vendor_id))]
    async fn create(&self, execution: &Execution) -> CoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO execution (vendor_type, vendor_id, status, status_message, trigger_type,
                extra_attrs, revision, start_time, update_time, end_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.vendor_type)
        .bind(execution.vendor_id)
        .bind(execution.status)
        .bind(&execution.status_message)
        .bind(execution.trigger)
        .bind(MappingHelpers::to_json(&execution.extra_attrs)?)
        .bind(execution.revision)
        .bind(execution.start_time)
        .bind(execution.update_time)
        .bind(execution.end_time)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("创建执行记录: {}", id);
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> CoreResult<Execution> {
        let mut execution = self.fetch(id).await?;
        execution.metrics = Some(self.metrics(id).await?);
        Ok(execution)
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &ExecutionQuery) -> CoreResult<Vec<Execution>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM execution WHERE 1 = 1");
        Self::push_filters(&mut builder, query);
        builder.push(" ORDER BY start_time DESC, id DESC");
        if let Some(page) = query.pagination {
            builder
                .push(" LIMIT ")
                .push_bind(page.page_size)
                .push(" OFFSET ")
                .push_bind(page.offset());
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut executions = rows
            .iter()
            .map(Self::row_to_execution)
            .collect::<CoreResult<Vec<_>>>()?;
        for execution in executions.iter_mut() {
            execution.metrics = Some(self.metrics(execution.id).await?);
        }
        Ok(executions)
    }

    #[instrument(skip(self))]
    async fn count(&self, query: &ExecutionQuery) -> CoreResult<i64> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS total FROM execution WHERE 1 = 1");
        Self::push_filters(&mut builder, query);
        let row = builder.build().fetch_one(&self.pool).await?;
        Ok(row.try_get("total")?)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: i64,
        status: ExecutionStatus,
        message: &str,
    ) -> CoreResult<()> {
        let now = Utc::now();
        let end_time = status.is_final().then_some(now);
        let result = sqlx::query(
            r#"
            UPDATE execution
            SET status = ?, status_message = ?, update_time = ?, end_time = ?, revision = revision + 1
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(message)
        .bind(now)
        .bind(end_time)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("execution", id));
        }
        Ok(())
    }

    #[instrument(skip(self, extra_attrs))]
    async fn update_extra_attrs(&self, id: i64, extra_attrs: &ExtraAttrs) -> CoreResult<()> {
        let result = sqlx::query("UPDATE execution SET extra_attrs = ?, update_time = ? WHERE id = ?")
            .bind(MappingHelpers::to_json(extra_attrs)?)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("execution", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn metrics(&self, id: i64) -> CoreResult<ExecutionMetrics> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS total FROM task WHERE execution_id = ? GROUP BY status",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut metrics = ExecutionMetrics::default();
        for row in rows {
            let status: TaskStatus = row.try_get("status")?;
            let total: i64 = row.try_get("total")?;
            metrics.task_count += total;
            match status {
                TaskStatus::Pending => metrics.pending_task_count += total,
                TaskStatus::Scheduled => metrics.scheduled_task_count += total,
                TaskStatus::Running => metrics.running_task_count += total,
                TaskStatus::Stopped => metrics.stopped_task_count += total,
                TaskStatus::Error => metrics.error_task_count += total,
                TaskStatus::Success => metrics.success_task_count += total,
            }
        }
        Ok(metrics)
    }

    /// 按任务状态重新汇总，基于 revision 做乐观写入
    ///
    /// 终态执行同样会被重算：后创建的任务未结束或失败时，执行状态随之改变。
    /// 没有任务的执行保持显式设置的状态。
    #[instrument(skip(self))]
    async fn refresh_status(&self, id: i64) -> CoreResult<ExecutionStatus> {
        for _ in 0..REFRESH_RETRIES {
            let current = self.fetch(id).await?;
            let status = match self.metrics(id).await?.rollup() {
                Some(status) if status != current.status => status,
                _ => return Ok(current.status),
            };

            let now = Utc::now();
            let end_time = status.is_final().then_some(now);
            let result = sqlx::query(
                r#"
                UPDATE execution
                SET status = ?, update_time = ?, end_time = ?, revision = revision + 1
                WHERE id = ? AND revision = ?
                "#,
            )
            .bind(status)
            .bind(now)
            .bind(end_time)
            .bind(id)
            .bind(current.revision)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() > 0 {
                debug!("执行 {} 状态汇总为 {}", id, status);
                return Ok(status);
            }
        }
        warn!("执行 {} 状态汇总重试次数耗尽", id);
        Err(CoreError::Conflict(format!("执行 {id} 状态被并发修改")))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM task WHERE execution_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM execution WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("execution", id));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::{test_pool, SqliteTaskRepository};
    use jobcore_core::models::{Pagination, Task, Trigger};
    use jobcore_core::traits::TaskRepository;

    async fn setup() -> (SqliteExecutionRepository, SqliteTaskRepository) {
        let pool = test_pool().await;
        (
            SqliteExecutionRepository::new(pool.clone()),
            SqliteTaskRepository::new(pool),
        )
    }

    fn execution(vendor_id: i64) -> Execution {
        Execution::new("RETENTION", vendor_id, Trigger::Manual, ExtraAttrs::new())
    }

    #[tokio::test]
    async fn test_refresh_status_rolls_up_tasks() {
        let (executions, tasks) = setup().await;
        let id = executions.create(&execution(1)).await.unwrap();
        let t1 = tasks.create(&Task::new(id, "RETENTION", ExtraAttrs::new())).await.unwrap();
        let t2 = tasks.create(&Task::new(id, "RETENTION", ExtraAttrs::new())).await.unwrap();

        tasks.update_status(t1, TaskStatus::Success, 1, "").await.unwrap();
        assert_eq!(executions.refresh_status(id).await.unwrap(), ExecutionStatus::Running);

        tasks.update_status(t2, TaskStatus::Error, 1, "boom").await.unwrap();
        assert_eq!(executions.refresh_status(id).await.unwrap(), ExecutionStatus::Error);

        let stored = executions.get(id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Error);
        assert!(stored.end_time.is_some());
        let metrics = stored.metrics.unwrap();
        assert_eq!(metrics.task_count, 2);
        assert_eq!(metrics.success_task_count, 1);
        assert_eq!(metrics.error_task_count, 1);
    }

    #[tokio::test]
    async fn test_final_execution_is_recomputed_for_late_task() {
        let (executions, tasks) = setup().await;
        let id = executions.create(&execution(1)).await.unwrap();
        let t1 = tasks.create(&Task::new(id, "RETENTION", ExtraAttrs::new())).await.unwrap();
        tasks.update_status(t1, TaskStatus::Success, 1, "").await.unwrap();
        assert_eq!(executions.refresh_status(id).await.unwrap(), ExecutionStatus::Success);

        let t2 = tasks.create(&Task::new(id, "RETENTION", ExtraAttrs::new())).await.unwrap();
        assert_eq!(executions.refresh_status(id).await.unwrap(), ExecutionStatus::Running);
        assert!(executions.get(id).await.unwrap().end_time.is_none());

        tasks.update_status(t2, TaskStatus::Error, 1, "boom").await.unwrap();
        assert_eq!(executions.refresh_status(id).await.unwrap(), ExecutionStatus::Error);
    }

    #[tokio::test]
    async fn test_refresh_without_tasks_keeps_explicit_status() {
        let (executions, _tasks) = setup().await;
        let id = executions.create(&execution(1)).await.unwrap();
        executions
            .update_status(id, ExecutionStatus::Success, "no resources")
            .await
            .unwrap();

        assert_eq!(executions.refresh_status(id).await.unwrap(), ExecutionStatus::Success);
        assert_eq!(executions.get(id).await.unwrap().status_message, "no resources");
    }

    #[tokio::test]
    async fn test_list_count_and_delete_cascade() {
        let (executions, tasks) = setup().await;
        for vendor_id in [1, 1, 1, 2] {
            executions.create(&execution(vendor_id)).await.unwrap();
        }
        let query = ExecutionQuery::by_vendor("RETENTION", 1);
        assert_eq!(executions.count(&query).await.unwrap(), 3);

        let page = executions
            .list(&query.clone().with_pagination(Some(Pagination::new(1, 2))))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].id > page[1].id);

        let id = page[0].id;
        tasks.create(&Task::new(id, "RETENTION", ExtraAttrs::new())).await.unwrap();
        executions.delete(id).await.unwrap();
        assert!(executions.get(id).await.unwrap_err().is_not_found());
        let remaining = tasks
            .list(&jobcore_core::models::TaskQuery::by_execution(id))
            .await
            .unwrap();
        assert!(remaining.is_empty());
        assert!(executions.delete(id).await.unwrap_err().is_not_found());
    }
}
