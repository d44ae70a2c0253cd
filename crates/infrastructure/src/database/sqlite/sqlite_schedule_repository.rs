use async_trait::async_trait;
use chrono::Utc;
use jobcore_core::models::{Schedule, ScheduleQuery};
use jobcore_core::traits::ScheduleRepository;
use jobcore_core::{CoreError, CoreResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &SqliteRow) -> CoreResult<Schedule> {
        Ok(Schedule {
            id: row.try_get("id")?,
            vendor_type: row.try_get("vendor_type")?,
            vendor_id: row.try_get("vendor_id")?,
            cron_type: row.try_get("cron_type")?,
            cron: row.try_get("cron")?,
            job_id: row.try_get("job_id")?,
            revision: row.try_get("revision")?,
            extra_attrs: MappingHelpers::json_column(row, "extra_attrs")?,
            callback_func_name: row.try_get("callback_func_name")?,
            callback_func_param: MappingHelpers::json_column(row, "callback_func_param")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    #[instrument(skip(self, schedule), fields(vendor_type = %schedule.vendor_type, vendor_id = schedule.vendor_id))]
    async fn create(&self, schedule: &Schedule) -> CoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO schedule (vendor_type, vendor_id, cron_type, cron, job_id, revision,
                extra_attrs, callback_func_name, callback_func_param, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&schedule.vendor_type)
        .bind(schedule.vendor_id)
        .bind(&schedule.cron_type)
        .bind(&schedule.cron)
        .bind(&schedule.job_id)
        .bind(schedule.revision)
        .bind(MappingHelpers::to_json(&schedule.extra_attrs)?)
        .bind(&schedule.callback_func_name)
        .bind(MappingHelpers::to_json(&schedule.callback_func_param)?)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            MappingHelpers::unique_violation(e, || {
                format!(
                    "vendor {}:{} 已存在调度",
                    schedule.vendor_type, schedule.vendor_id
                )
            })
        })?;

        let id = result.last_insert_rowid();
        debug!("创建调度记录: {}", id);
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> CoreResult<Schedule> {
        let row = sqlx::query("SELECT * FROM schedule WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Self::row_to_schedule(&row),
            None => Err(CoreError::not_found("schedule", id)),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &ScheduleQuery) -> CoreResult<Vec<Schedule>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM schedule WHERE 1 = 1");
        if let Some(vendor_type) = &query.vendor_type {
            builder.push(" AND vendor_type = ").push_bind(vendor_type);
        }
        if let Some(vendor_id) = query.vendor_id {
            builder.push(" AND vendor_id = ").push_bind(vendor_id);
        }
        if let Some(name) = &query.callback_func_name {
            builder.push(" AND callback_func_name = ").push_bind(name);
        }
        builder.push(" ORDER BY id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_schedule).collect()
    }

    #[instrument(skip(self))]
    async fn update_job_id(&self, id: i64, job_id: &str) -> CoreResult<()> {
        let result = sqlx::query("UPDATE schedule SET job_id = ?, updated_at = ? WHERE id = ?")
            .bind(job_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("schedule", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_revision(&self, id: i64, revision: i64) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE schedule SET revision = ?, updated_at = ? WHERE id = ? AND revision < ?",
        )
        .bind(revision)
        .bind(Utc::now())
        .bind(id)
        .bind(revision)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM schedule WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("schedule", id));
        }
        Ok(())
    }
}
