//! Shared database mapping utilities
//!
//! JSON columns are stored as TEXT in SQLite; these helpers convert them
//! and translate constraint violations into the error taxonomy.

use jobcore_core::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub struct MappingHelpers;

impl MappingHelpers {
    /// Decode a TEXT column holding JSON
    pub fn json_column<T: DeserializeOwned>(row: &SqliteRow, field_name: &str) -> CoreResult<T> {
        let raw: String = row.try_get(field_name)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn to_json<T: Serialize + ?Sized>(value: &T) -> CoreResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode a TEXT column through `FromStr`
    pub fn parsed_column<T>(row: &SqliteRow, field_name: &str) -> CoreResult<T>
    where
        T: std::str::FromStr<Err = CoreError>,
    {
        let raw: String = row.try_get(field_name)?;
        raw.parse()
    }

    /// 唯一约束冲突转换为 Conflict，其他错误原样返回
    pub fn unique_violation(error: sqlx::Error, message: impl FnOnce() -> String) -> CoreError {
        let is_unique = error
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);
        if is_unique {
            CoreError::Conflict(message())
        } else {
            CoreError::Database(error)
        }
    }
}
