use async_trait::async_trait;
use jobcore_core::{CoreError, CoreResult};
use jobcore_domain::immutable::ImmutableRule;
use jobcore_domain::repositories::ImmutableRuleRepository;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

pub struct SqliteImmutableRuleRepository {
    pool: SqlitePool,
}

impl SqliteImmutableRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_rule(row: &SqliteRow) -> CoreResult<ImmutableRule> {
        Ok(ImmutableRule {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            tag_filter: MappingHelpers::json_column(row, "tag_filter")?,
            disabled: row.try_get("disabled")?,
            creation_time: row.try_get("creation_time")?,
        })
    }

    fn duplicate(project_id: i64) -> impl FnOnce() -> String {
        move || format!("项目 {project_id} 已存在相同的不可变规则")
    }
}

#[async_trait]
impl ImmutableRuleRepository for SqliteImmutableRuleRepository {
    #[instrument(skip(self, rule), fields(project_id = rule.project_id))]
    async fn create(&self, rule: &ImmutableRule) -> CoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO immutable_tag_rule (project_id, tag_filter, tag_filter_hash, disabled, creation_time)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(rule.project_id)
        .bind(MappingHelpers::to_json(&rule.tag_filter)?)
        .bind(rule.tag_filter.name_hash()?)
        .bind(rule.disabled)
        .bind(rule.creation_time)
        .execute(&self.pool)
        .await
        .map_err(|e| MappingHelpers::unique_violation(e, Self::duplicate(rule.project_id)))?;

        let id = result.last_insert_rowid();
        debug!("创建不可变规则: {}", id);
        Ok(id)
    }

    #[instrument(skip(self, rule), fields(id = rule.id))]
    async fn update(&self, rule: &ImmutableRule) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE immutable_tag_rule SET tag_filter = ?, tag_filter_hash = ?, disabled = ? WHERE id = ?",
        )
        .bind(MappingHelpers::to_json(&rule.tag_filter)?)
        .bind(rule.tag_filter.name_hash()?)
        .bind(rule.disabled)
        .bind(rule.id)
        .execute(&self.pool)
        .await
        .map_err(|e| MappingHelpers::unique_violation(e, Self::duplicate(rule.project_id)))?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("immutable rule", rule.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> CoreResult<ImmutableRule> {
        let row = sqlx::query("SELECT * FROM immutable_tag_rule WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Self::row_to_rule(&row),
            None => Err(CoreError::not_found("immutable rule", id)),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM immutable_tag_rule WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("immutable rule", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, project_id: i64, only_enabled: bool) -> CoreResult<Vec<ImmutableRule>> {
        let sql = if only_enabled {
            "SELECT * FROM immutable_tag_rule WHERE project_id = ? AND disabled = 0 ORDER BY id"
        } else {
            "SELECT * FROM immutable_tag_rule WHERE project_id = ? ORDER BY id"
        };
        let rows = sqlx::query(sql).bind(project_id).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_rule).collect()
    }

    #[instrument(skip(self))]
    async fn set_disabled(&self, id: i64, disabled: bool) -> CoreResult<()> {
        let result = sqlx::query("UPDATE immutable_tag_rule SET disabled = ? WHERE id = ?")
            .bind(disabled)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("immutable rule", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_by_project(&self, project_id: i64) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM immutable_tag_rule WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::test_pool;
    use jobcore_domain::immutable::RuleMetadata;
    use jobcore_domain::selectors::SelectorSpec;

    fn rule(project_id: i64, tag_pattern: &str) -> ImmutableRule {
        ImmutableRule::new(
            project_id,
            RuleMetadata::new(
                SelectorSpec::doublestar("repoMatches", "redis"),
                SelectorSpec::doublestar("matches", tag_pattern),
            ),
        )
    }

    #[tokio::test]
    async fn test_duplicate_rule_in_project_conflicts() {
        let repo = SqliteImmutableRuleRepository::new(test_pool().await);
        repo.create(&rule(1, "release-**")).await.unwrap();
        assert!(repo.create(&rule(1, "release-**")).await.unwrap_err().is_conflict());
        assert!(repo.create(&rule(2, "release-**")).await.is_ok());
        assert!(repo.create(&rule(1, "v*")).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_only_enabled() {
        let repo = SqliteImmutableRuleRepository::new(test_pool().await);
        let a = repo.create(&rule(1, "release-**")).await.unwrap();
        repo.create(&rule(1, "v*")).await.unwrap();
        repo.set_disabled(a, true).await.unwrap();

        assert_eq!(repo.list(1, false).await.unwrap().len(), 2);
        let enabled = repo.list(1, true).await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].tag_filter.tag_selectors[0].pattern, "v*");

        assert_eq!(repo.delete_by_project(1).await.unwrap(), 2);
        assert!(repo.get(a).await.unwrap_err().is_not_found());
    }
}
