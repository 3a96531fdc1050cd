// src/models/mod.rs

pub mod area;
pub mod assignment;
pub mod audit_response;
pub mod audit_template;
pub mod company;
pub mod question;
pub mod user;

use serde::{Deserialize, Deserializer, Serialize};

/// Query parameters for offset-paginated listings.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub skip: Option<i64>,
    /// Number of items to return (default: 100, max: 100).
    pub limit: Option<i64>,
}

impl ListParams {
    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(100).clamp(1, 100)
    }
}

/// For patch fields that can be cleared: an absent key stays `None`
/// (through `#[serde(default)]`) while an explicit `null` becomes `Some(None)`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A page of results plus the total number of matching rows.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub count: i64,
}
