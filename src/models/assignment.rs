// src/models/assignment.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::{double_option, question::AssignedQuestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assignment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Pending,
    InProgress,
    Completed,
    Overdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_periodicity", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Periodicity {
    OneTime,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

/// Represents the 'audit_assignments' table.
/// One template handed to one company, optionally narrowed to an area.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditAssignment {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    pub status: AssignmentStatus,
    pub periodicity: Option<Periodicity>,
    pub next_due_date: Option<chrono::NaiveDate>,
    /// Visible to every member of the company regardless of area.
    pub is_public: bool,
    pub audit_template_id: i64,
    pub company_id: i64,
    pub area_id: Option<i64>,
    pub created_by_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// An assignment with its frozen question snapshot.
#[derive(Debug, Serialize)]
pub struct AssignmentDetail {
    #[serde(flatten)]
    pub assignment: AuditAssignment,
    pub audit_type_definition_key: String,
    pub assigned_questions: Vec<AssignedQuestion>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssignmentRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    pub periodicity: Option<Periodicity>,
    pub next_due_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub is_public: bool,
    pub audit_template_id: i64,
    pub company_id: i64,
    pub area_id: Option<i64>,
}

/// Absent fields are left unchanged. An explicit `null` clears the due
/// dates, the periodicity or the area.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAssignmentRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<chrono::DateTime<chrono::Utc>>>,
    pub status: Option<AssignmentStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub periodicity: Option<Option<Periodicity>>,
    #[serde(default, deserialize_with = "double_option")]
    pub next_due_date: Option<Option<chrono::NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub area_id: Option<Option<i64>>,
    pub is_public: Option<bool>,
}

impl UpdateAssignmentRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
            && self.periodicity.is_none()
            && self.next_due_date.is_none()
            && self.area_id.is_none()
            && self.is_public.is_none()
    }
}
