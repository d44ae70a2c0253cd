pub mod execution;
pub mod job;
pub mod query;
pub mod schedule;
pub mod task;

pub use execution::{Execution, ExecutionMetrics, ExecutionStatus, Trigger};
pub use job::{
    HookUrls, JobAction, JobData, JobKind, JobMetadata, JobStats, JobStatus, PeriodicJob,
    StatusChange, StatusChangeMetadata,
};
pub use query::{ExecutionQuery, Pagination, ScheduleQuery, TaskQuery};
pub use schedule::Schedule;
pub use task::{Task, TaskStatus};

/// 扩展属性，以JSON对象形式持久化
pub type ExtraAttrs = serde_json::Map<String, serde_json::Value>;

/// 常用的 vendor 类型
pub mod vendor {
    pub const RETENTION: &str = "RETENTION";
    pub const SYSTEM_ARTIFACT_CLEANUP: &str = "SYSTEM_ARTIFACT_CLEANUP";
    pub const WEBHOOK: &str = "WEBHOOK";
    pub const SCHEDULER: &str = "SCHEDULER";
}

/// 为以文本形式存储的状态枚举实现 sqlx 的 SQLite 编解码
#[macro_export]
macro_rules! impl_sqlite_text_enum {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Sqlite> for $ty {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $ty {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                s.parse::<$ty>().map_err(|e| e.to_string().into())
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
            }
        }
    };
}
