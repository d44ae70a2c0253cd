use async_trait::async_trait;
use chrono::Utc;
use jobcore_core::models::TaskStatus;
use jobcore_core::{CoreError, CoreResult};
use jobcore_domain::repositories::{WebhookJobRepository, WebhookPolicyRepository};
use jobcore_domain::webhook::{LastTrigger, WebhookJob, WebhookJobQuery, WebhookPolicy};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

/// webhook 策略仓储，targets 与 event_types 以JSON数组保存
pub struct SqliteWebhookPolicyRepository {
    pool: SqlitePool,
}

impl SqliteWebhookPolicyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_policy(row: &SqliteRow) -> CoreResult<WebhookPolicy> {
        Ok(WebhookPolicy {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            targets: MappingHelpers::json_column(row, "targets")?,
            event_types: MappingHelpers::json_column(row, "event_types")?,
            creator: row.try_get("creator")?,
            enabled: row.try_get("enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl WebhookPolicyRepository for SqliteWebhookPolicyRepository {
    #[instrument(skip(self, policy), fields(project_id = policy.project_id, name = %policy.name))]
    async fn create(&self, policy: &WebhookPolicy) -> CoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_policy (project_id, name, description, targets, event_types,
                creator, enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(policy.project_id)
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(MappingHelpers::to_json(&policy.targets)?)
        .bind(MappingHelpers::to_json(&policy.event_types)?)
        .bind(&policy.creator)
        .bind(policy.enabled)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            MappingHelpers::unique_violation(e, || {
                format!("项目 {} 已存在名为 {} 的策略", policy.project_id, policy.name)
            })
        })?;

        let id = result.last_insert_rowid();
        debug!("创建webhook策略: {}", id);
        Ok(id)
    }

    #[instrument(skip(self, policy), fields(id = policy.id))]
    async fn update(&self, policy: &WebhookPolicy) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_policy
            SET name = ?, description = ?, targets = ?, event_types = ?, enabled = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(MappingHelpers::to_json(&policy.targets)?)
        .bind(MappingHelpers::to_json(&policy.event_types)?)
        .bind(policy.enabled)
        .bind(Utc::now())
        .bind(policy.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            MappingHelpers::unique_violation(e, || {
                format!("项目 {} 已存在名为 {} 的策略", policy.project_id, policy.name)
            })
        })?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("webhook policy", policy.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM webhook_policy WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("webhook policy", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> CoreResult<WebhookPolicy> {
        let row = sqlx::query("SELECT * FROM webhook_policy WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Self::row_to_policy(&row),
            None => Err(CoreError::not_found("webhook policy", id)),
        }
    }

    #[instrument(skip(self))]
    async fn get_by_name(&self, project_id: i64, name: &str) -> CoreResult<Option<WebhookPolicy>> {
        let row = sqlx::query("SELECT * FROM webhook_policy WHERE project_id = ? AND name = ?")
            .bind(project_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_policy).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, project_id: i64) -> CoreResult<Vec<WebhookPolicy>> {
        let rows = sqlx::query("SELECT * FROM webhook_policy WHERE project_id = ? ORDER BY id")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_policy).collect()
    }

    #[instrument(skip(self))]
    async fn delete_by_project(&self, project_id: i64) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM webhook_policy WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// webhook 投递记录仓储
pub struct SqliteWebhookJobRepository {
    pool: SqlitePool,
}

impl SqliteWebhookJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &SqliteRow) -> CoreResult<WebhookJob> {
        Ok(WebhookJob {
            id: row.try_get("id")?,
            policy_id: row.try_get("policy_id")?,
            event_type: MappingHelpers::parsed_column(row, "event_type")?,
            notify_type: row.try_get("notify_type")?,
            job_detail: row.try_get("job_detail")?,
            uuid: row.try_get("uuid")?,
            status: row.try_get("status")?,
            creation_time: row.try_get("creation_time")?,
            update_time: row.try_get("update_time")?,
        })
    }
}

#[async_trait]
impl WebhookJobRepository for SqliteWebhookJobRepository {
    #[instrument(skip(self, job), fields(policy_id = job.policy_id))]
    async fn create(&self, job: &WebhookJob) -> CoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_job (policy_id, event_type, notify_type, job_detail, uuid, status,
                creation_time, update_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.policy_id)
        .bind(job.event_type.as_str())
        .bind(&job.notify_type)
        .bind(&job.job_detail)
        .bind(&job.uuid)
        .bind(job.status)
        .bind(job.creation_time)
        .bind(job.update_time)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> CoreResult<WebhookJob> {
        let row = sqlx::query("SELECT * FROM webhook_job WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Self::row_to_job(&row),
            None => Err(CoreError::not_found("webhook job", id)),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, query: &WebhookJobQuery) -> CoreResult<Vec<WebhookJob>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM webhook_job WHERE 1 = 1");
        if let Some(policy_id) = query.policy_id {
            builder.push(" AND policy_id = ").push_bind(policy_id);
        }
        if let Some(event_type) = query.event_type {
            builder.push(" AND event_type = ").push_bind(event_type.as_str());
        }
        if !query.statuses.is_empty() {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in &query.statuses {
                separated.push_bind(*status);
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn update_uuid(&self, id: i64, uuid: &str) -> CoreResult<()> {
        let result = sqlx::query("UPDATE webhook_job SET uuid = ?, update_time = ? WHERE id = ?")
            .bind(uuid)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("webhook job", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: i64,
        status: TaskStatus,
        from: &[TaskStatus],
    ) -> CoreResult<bool> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE webhook_job SET status = ");
        builder
            .push_bind(status)
            .push(", update_time = ")
            .push_bind(Utc::now())
            .push(" WHERE id = ")
            .push_bind(id);
        if !from.is_empty() {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for s in from {
                separated.push_bind(*s);
            }
            separated.push_unseparated(")");
        }
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn last_triggered(&self, policy_id: i64) -> CoreResult<Vec<LastTrigger>> {
        let rows = sqlx::query(
            r#"
            SELECT event_type, MAX(creation_time) AS last_trigger_time
            FROM webhook_job
            WHERE policy_id = ?
            GROUP BY event_type
            ORDER BY event_type
            "#,
        )
        .bind(policy_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LastTrigger {
                    event_type: MappingHelpers::parsed_column(row, "event_type")?,
                    last_trigger_time: row.try_get("last_trigger_time")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn delete_by_policy(&self, policy_id: i64) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM webhook_job WHERE policy_id = ?")
            .bind(policy_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
