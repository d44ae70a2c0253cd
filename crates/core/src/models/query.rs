use serde::{Deserialize, Serialize};

use super::{ExecutionStatus, TaskStatus};

/// 分页参数，page 从1开始
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleQuery {
    pub vendor_type: Option<String>,
    pub vendor_id: Option<i64>,
    pub callback_func_name: Option<String>,
}

impl ScheduleQuery {
    pub fn by_vendor(vendor_type: impl Into<String>, vendor_id: i64) -> Self {
        Self {
            vendor_type: Some(vendor_type.into()),
            vendor_id: Some(vendor_id),
            callback_func_name: None,
        }
    }
}

/// 执行记录查询，结果按开始时间倒序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionQuery {
    pub vendor_type: Option<String>,
    pub vendor_id: Option<i64>,
    pub status: Option<ExecutionStatus>,
    pub pagination: Option<Pagination>,
}

impl ExecutionQuery {
    pub fn by_vendor(vendor_type: impl Into<String>, vendor_id: i64) -> Self {
        Self {
            vendor_type: Some(vendor_type.into()),
            vendor_id: Some(vendor_id),
            ..Default::default()
        }
    }

    pub fn with_pagination(mut self, pagination: Option<Pagination>) -> Self {
        self.pagination = pagination;
        self
    }
}

/// 任务查询，结果按ID升序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub execution_id: Option<i64>,
    pub vendor_type: Option<String>,
    pub status: Option<TaskStatus>,
    pub pagination: Option<Pagination>,
}

impl TaskQuery {
    pub fn by_execution(execution_id: i64) -> Self {
        Self {
            execution_id: Some(execution_id),
            ..Default::default()
        }
    }

    pub fn with_pagination(mut self, pagination: Option<Pagination>) -> Self {
        self.pagination = pagination;
        self
    }
}
