// src/models/area.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'areas' table: a physical or organisational zone of a company.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Area {
    pub id: i64,
    pub company_id: i64,
    /// Unique within its company.
    pub name: String,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAreaRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAreaRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
}
