use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ExtraAttrs;

/// 周期调度记录
///
/// `(vendor_type, vendor_id)` 唯一；`revision` 单调不减，用于丢弃乱序到达的回调。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub vendor_type: String,
    pub vendor_id: i64,
    pub cron_type: String,
    pub cron: String,
    /// worker pool 返回的周期任务句柄
    pub job_id: Option<String>,
    pub revision: i64,
    pub extra_attrs: ExtraAttrs,
    pub callback_func_name: String,
    pub callback_func_param: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(
        vendor_type: impl Into<String>,
        vendor_id: i64,
        cron_type: impl Into<String>,
        cron: impl Into<String>,
        callback_func_name: impl Into<String>,
        callback_func_param: Value,
        extra_attrs: ExtraAttrs,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            vendor_type: vendor_type.into(),
            vendor_id,
            cron_type: cron_type.into(),
            cron: cron.into(),
            job_id: None,
            revision: 0,
            extra_attrs,
            callback_func_name: callback_func_name.into(),
            callback_func_param,
            created_at: now,
            updated_at: now,
        }
    }
}
