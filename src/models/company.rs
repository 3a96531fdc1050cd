// src/models/company.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'companies' table. The tenant boundary.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub details: Option<String>,
    /// Demo tenants used for showcasing the product.
    pub is_demo: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCompanyRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub details: Option<String>,
    #[serde(default)]
    pub is_demo: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub details: Option<String>,
    pub is_demo: Option<bool>,
}
