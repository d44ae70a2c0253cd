use async_trait::async_trait;
use chrono::Utc;
use jobcore_core::{CoreError, CoreResult};
use jobcore_domain::repositories::RetentionPolicyRepository;
use jobcore_domain::retention::{RetentionPolicy, SCOPE_LEVEL_PROJECT};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

/// 保留策略以完整JSON保存在 data 列，范围与触发方式单独成列以便查询
pub struct SqliteRetentionPolicyRepository {
    pool: SqlitePool,
}

impl SqliteRetentionPolicyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_policy(row: &SqliteRow) -> CoreResult<RetentionPolicy> {
        let mut policy: RetentionPolicy = MappingHelpers::json_column(row, "data")?;
        policy.id = row.try_get("id")?;
        policy.created_at = row.try_get("created_at")?;
        policy.updated_at = row.try_get("updated_at")?;
        Ok(policy)
    }
}

#[async_trait]
impl RetentionPolicyRepository for SqliteRetentionPolicyRepository {
    #[instrument(skip(self, policy), fields(project_id = policy.project_id()))]
    async fn create(&self, policy: &RetentionPolicy) -> CoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO retention_policy (scope_level, scope_reference, trigger_kind, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&policy.scope.level)
        .bind(policy.scope.reference)
        .bind(policy.trigger.kind.to_string())
        .bind(MappingHelpers::to_json(policy)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("创建保留策略: {}", id);
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> CoreResult<RetentionPolicy> {
        let row = sqlx::query("SELECT * FROM retention_policy WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Self::row_to_policy(&row),
            None => Err(CoreError::not_found("retention policy", id)),
        }
    }

    #[instrument(skip(self, policy), fields(id = policy.id))]
    async fn update(&self, policy: &RetentionPolicy) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE retention_policy
            SET scope_level = ?, scope_reference = ?, trigger_kind = ?, data = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&policy.scope.level)
        .bind(policy.scope.reference)
        .bind(policy.trigger.kind.to_string())
        .bind(MappingHelpers::to_json(policy)?)
        .bind(Utc::now())
        .bind(policy.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("retention policy", policy.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM retention_policy WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("retention policy", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_by_project(&self, project_id: i64) -> CoreResult<Vec<RetentionPolicy>> {
        let rows = sqlx::query(
            "SELECT * FROM retention_policy WHERE scope_level = ? AND scope_reference = ? ORDER BY id",
        )
        .bind(SCOPE_LEVEL_PROJECT)
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_policy).collect()
    }
}
