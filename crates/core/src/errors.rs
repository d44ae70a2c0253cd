use std::fmt;

use thiserror::Error;

/// 核心错误类型定义
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("{resource}未找到: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("资源冲突: {0}")]
    Conflict(String),

    #[error("禁止修改: {0}")]
    Forbidden(String),

    #[error("服务不可用: {0}")]
    Unavailable(String),

    #[error("任务服务返回错误 {code}: {message}")]
    JobService { code: u16, message: String },

    #[error("制品受不可变规则保护: {0}")]
    Immutable(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 对外暴露的错误分类，供上层映射为HTTP状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    Forbidden,
    Unavailable,
    Internal,
    Immutable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Internal => "Internal",
            ErrorKind::Immutable => "ImmutableError",
        };
        f.write_str(s)
    }
}

impl CoreError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        CoreError::InvalidArgument(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidArgument(_) | CoreError::InvalidCron { .. } => {
                ErrorKind::InvalidArgument
            }
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::Unavailable(_) => ErrorKind::Unavailable,
            CoreError::JobService { code, .. } => match code {
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                _ => ErrorKind::Unavailable,
            },
            CoreError::Immutable(_) => ErrorKind::Immutable,
            CoreError::Database(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            CoreError::Database(_) | CoreError::Serialization(_) | CoreError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// 统一的Result类型
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_service_errors_map_by_code() {
        let gone = CoreError::JobService {
            code: 404,
            message: "job not found".to_string(),
        };
        assert_eq!(gone.kind(), ErrorKind::NotFound);
        assert!(gone.is_not_found());

        let busy = CoreError::JobService {
            code: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(busy.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_cron_error_is_invalid_argument() {
        let err = CoreError::InvalidCron {
            expr: "bad".to_string(),
            message: "字段数量错误".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_immutable_kind_display() {
        let err = CoreError::Immutable("redis:release-1.0".to_string());
        assert_eq!(err.kind().to_string(), "ImmutableError");
    }
}
