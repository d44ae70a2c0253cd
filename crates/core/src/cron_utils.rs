use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::errors::{CoreError, CoreResult};

/// cron 表达式必须包含的字段数：秒 分 时 日 月 周
pub const CRON_FIELDS: usize = 6;

/// 带秒字段的CRON表达式
#[derive(Debug, Clone)]
pub struct CronSpec {
    expr: String,
    schedule: Schedule,
}

impl CronSpec {
    /// 解析CRON表达式，字段数必须恰好为6
    pub fn parse(cron_expr: &str) -> CoreResult<Self> {
        let fields = cron_expr.split_whitespace().count();
        if fields != CRON_FIELDS {
            return Err(CoreError::InvalidCron {
                expr: cron_expr.to_string(),
                message: format!("需要{CRON_FIELDS}个字段，实际为{fields}个"),
            });
        }

        let schedule = Schedule::from_str(cron_expr).map_err(|e| CoreError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expr: cron_expr.to_string(),
            schedule,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}

/// 验证CRON表达式是否有效
pub fn validate_cron_expression(cron_expr: &str) -> CoreResult<()> {
    CronSpec::parse(cron_expr).map(|_| ())
}
