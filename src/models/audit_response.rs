// src/models/audit_response.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::models::question::QuestionBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "response_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    #[default]
    Draft,
    Submitted,
}

/// Represents the 'audit_responses' table.
/// `score` is only ever set while the status is SUBMITTED.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditResponse {
    pub id: i64,
    pub audit_assignment_id: i64,
    pub auditor_id: i64,
    pub status: ResponseStatus,
    pub score: Option<f64>,
    pub overall_comments: Option<String>,
    pub photo_urls: Json<Vec<String>>,
    pub submission_date: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'answers' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Answer {
    pub id: i64,
    pub audit_response_id: i64,
    pub assigned_question_id: i64,
    pub answer_value: Option<Value>,
    pub comments: Option<String>,
    pub photo_urls: Json<Vec<String>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A response together with its answers.
#[derive(Debug, Serialize)]
pub struct ResponseDetail {
    #[serde(flatten)]
    pub response: AuditResponse,
    pub answers: Vec<Answer>,
}

/// An answer joined with the assigned question it answers: the input of
/// score calculation.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ScoredAnswer {
    pub answer_value: Option<Value>,
    #[sqlx(flatten)]
    pub question: QuestionBody,
}

fn validate_photo_urls(urls: &[String]) -> Result<(), validator::ValidationError> {
    if urls.len() > 20 {
        return Err(validator::ValidationError::new("too_many_photos"));
    }
    for raw in urls {
        if url::Url::parse(raw).is_err() {
            return Err(validator::ValidationError::new("invalid_photo_url"));
        }
    }
    Ok(())
}

/// One answer in a create/update payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnswerInput {
    pub assigned_question_id: i64,
    #[serde(default)]
    pub answer_value: Option<Value>,
    #[validate(length(max = 5000))]
    pub comments: Option<String>,
    #[validate(custom(function = validate_photo_urls))]
    pub photo_urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateResponseRequest {
    #[validate(length(max = 10000))]
    pub overall_comments: Option<String>,
    #[validate(custom(function = validate_photo_urls))]
    pub photo_urls: Option<Vec<String>>,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    #[validate(nested)]
    pub answers: Vec<AnswerInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateResponseRequest {
    #[validate(length(max = 10000))]
    pub overall_comments: Option<String>,
    #[validate(custom(function = validate_photo_urls))]
    pub photo_urls: Option<Vec<String>>,
    pub status: Option<ResponseStatus>,
    #[validate(nested)]
    pub answers: Option<Vec<AnswerInput>>,
}
