// src/models/question.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::models::double_option;

/// Closed set of question kinds a template can contain.
/// Mapped to the Postgres enum `question_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "question_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Text,
    MultipleChoiceSingle,
    MultipleChoiceMultiple,
    YesNo,
    RatingScale,
    SectionHeader,
}

impl QuestionType {
    pub fn is_multiple_choice(self) -> bool {
        matches!(
            self,
            QuestionType::MultipleChoiceSingle | QuestionType::MultipleChoiceMultiple
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Text => "TEXT",
            QuestionType::MultipleChoiceSingle => "MULTIPLE_CHOICE_SINGLE",
            QuestionType::MultipleChoiceMultiple => "MULTIPLE_CHOICE_MULTIPLE",
            QuestionType::YesNo => "YES_NO",
            QuestionType::RatingScale => "RATING_SCALE",
            QuestionType::SectionHeader => "SECTION_HEADER",
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields shared by template questions and their assigned snapshots.
/// This is the shape the audit type definitions validate and score.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct QuestionBody {
    pub text: String,
    pub question_type: QuestionType,
    /// Free-form JSON: `{min, max}` for rating scales, a label list for
    /// multiple choice, empty otherwise.
    pub options: Option<Value>,
    pub order: i32,
    pub is_mandatory: bool,
    pub section_id: Option<String>,
    pub scoring_weight: Option<f64>,
}

/// Represents the 'question_templates' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionTemplate {
    pub id: i64,
    pub audit_template_id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub body: QuestionBody,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'assigned_questions' table.
/// A frozen copy of a template question taken when the assignment was created.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssignedQuestion {
    pub id: i64,
    pub audit_assignment_id: i64,
    /// Audit trail back to the template question this was cloned from.
    pub original_question_template_id: Option<i64>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub body: QuestionBody,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

static SECTION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,255}$").expect("section id pattern compiles"));

fn validate_section_id(section_id: &str) -> Result<(), ValidationError> {
    if !SECTION_ID_RE.is_match(section_id) {
        return Err(ValidationError::new("invalid_section_id"));
    }
    Ok(())
}

fn validate_section_patch(section_id: &Option<Option<String>>) -> Result<(), ValidationError> {
    match section_id {
        Some(Some(section_id)) => validate_section_id(section_id),
        _ => Ok(()),
    }
}

fn validate_question_patch(patch: &UpdateQuestionRequest) -> Result<(), ValidationError> {
    validate_section_patch(&patch.section_id)?;
    if let Some(Some(weight)) = patch.scoring_weight {
        if weight < 0.0 {
            return Err(ValidationError::new("negative_scoring_weight"));
        }
    }
    Ok(())
}

fn validate_assigned_patch(patch: &UpdateAssignedQuestionRequest) -> Result<(), ValidationError> {
    validate_section_patch(&patch.section_id)
}

fn default_true() -> bool {
    true
}

/// DTO for adding a question to a template.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    pub question_type: QuestionType,
    pub options: Option<Value>,
    #[validate(range(min = 0))]
    pub order: i32,
    #[serde(default = "default_true")]
    pub is_mandatory: bool,
    #[validate(custom(function = validate_section_id))]
    pub section_id: Option<String>,
    #[validate(range(min = 0.0))]
    pub scoring_weight: Option<f64>,
}

impl CreateQuestionRequest {
    pub fn into_body(self) -> QuestionBody {
        QuestionBody {
            text: self.text,
            question_type: self.question_type,
            options: self.options,
            order: self.order,
            is_mandatory: self.is_mandatory,
            section_id: self.section_id,
            scoring_weight: self.scoring_weight,
        }
    }
}

/// DTO for updating a template question. Absent fields are left unchanged;
/// `options`, `section_id` and `scoring_weight` are cleared by an explicit `null`.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_question_patch))]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: Option<String>,
    pub question_type: Option<QuestionType>,
    #[serde(default, deserialize_with = "double_option")]
    pub options: Option<Option<Value>>,
    #[validate(range(min = 0))]
    pub order: Option<i32>,
    pub is_mandatory: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub section_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub scoring_weight: Option<Option<f64>>,
}

impl UpdateQuestionRequest {
    /// Merges the patch onto `current` so the result can be validated
    /// before anything is written.
    pub fn apply(self, current: &QuestionBody) -> QuestionBody {
        QuestionBody {
            text: self.text.unwrap_or_else(|| current.text.clone()),
            question_type: self.question_type.unwrap_or(current.question_type),
            options: self.options.unwrap_or_else(|| current.options.clone()),
            order: self.order.unwrap_or(current.order),
            is_mandatory: self.is_mandatory.unwrap_or(current.is_mandatory),
            section_id: self.section_id.unwrap_or_else(|| current.section_id.clone()),
            scoring_weight: self.scoring_weight.unwrap_or(current.scoring_weight),
        }
    }
}

/// DTO for editing an assigned question snapshot.
/// `question_type` is accepted only so a change attempt can be rejected.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_assigned_patch))]
pub struct UpdateAssignedQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: Option<String>,
    pub question_type: Option<QuestionType>,
    #[serde(default, deserialize_with = "double_option")]
    pub options: Option<Option<Value>>,
    #[validate(range(min = 0))]
    pub order: Option<i32>,
    pub is_mandatory: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub section_id: Option<Option<String>>,
}

impl UpdateAssignedQuestionRequest {
    pub fn changes_type(&self, current: QuestionType) -> bool {
        self.question_type.is_some_and(|t| t != current)
    }

    pub fn apply(self, current: &QuestionBody) -> QuestionBody {
        QuestionBody {
            text: self.text.unwrap_or_else(|| current.text.clone()),
            question_type: current.question_type,
            options: self.options.unwrap_or_else(|| current.options.clone()),
            order: self.order.unwrap_or(current.order),
            is_mandatory: self.is_mandatory.unwrap_or(current.is_mandatory),
            section_id: self.section_id.unwrap_or_else(|| current.section_id.clone()),
            scoring_weight: current.scoring_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rating_body() -> QuestionBody {
        QuestionBody {
            text: "Is the floor clean?".to_string(),
            question_type: QuestionType::RatingScale,
            options: Some(json!({"min": 1, "max": 5})),
            order: 1,
            is_mandatory: true,
            section_id: Some("shine".to_string()),
            scoring_weight: Some(1.0),
        }
    }

    #[test]
    fn question_type_uses_screaming_snake_case_on_the_wire() {
        let encoded = serde_json::to_value(QuestionType::MultipleChoiceSingle).unwrap();
        assert_eq!(encoded, json!("MULTIPLE_CHOICE_SINGLE"));

        let decoded: QuestionType = serde_json::from_value(json!("YES_NO")).unwrap();
        assert_eq!(decoded, QuestionType::YesNo);
        assert_eq!(QuestionType::RatingScale.to_string(), "RATING_SCALE");
    }

    #[test]
    fn update_patch_keeps_untouched_fields() {
        let patch: UpdateQuestionRequest =
            serde_json::from_value(json!({"text": "Is the bench clean?", "order": 4})).unwrap();
        let merged = patch.apply(&rating_body());

        assert_eq!(merged.text, "Is the bench clean?");
        assert_eq!(merged.order, 4);
        assert_eq!(merged.options, Some(json!({"min": 1, "max": 5})));
        assert_eq!(merged.scoring_weight, Some(1.0));
    }

    #[test]
    fn null_clears_and_absent_keeps() {
        let cleared: UpdateQuestionRequest = serde_json::from_value(json!({
            "options": null,
            "section_id": null,
            "scoring_weight": null
        }))
        .unwrap();
        assert!(cleared.validate().is_ok());
        let merged = cleared.apply(&rating_body());
        assert_eq!(merged.options, None);
        assert_eq!(merged.section_id, None);
        assert_eq!(merged.scoring_weight, None);

        let kept: UpdateAssignedQuestionRequest =
            serde_json::from_value(json!({"text": "Is the aisle clear?"})).unwrap();
        let merged = kept.apply(&rating_body());
        assert_eq!(merged.section_id.as_deref(), Some("shine"));
        assert_eq!(merged.options, Some(json!({"min": 1, "max": 5})));

        let snapshot_cleared: UpdateAssignedQuestionRequest =
            serde_json::from_value(json!({"section_id": null})).unwrap();
        assert_eq!(snapshot_cleared.apply(&rating_body()).section_id, None);
    }

    #[test]
    fn patches_still_check_section_and_weight() {
        let bad_section: UpdateAssignedQuestionRequest =
            serde_json::from_value(json!({"section_id": "Not A Slug"})).unwrap();
        assert!(bad_section.validate().is_err());

        let bad_weight: UpdateQuestionRequest =
            serde_json::from_value(json!({"scoring_weight": -1.0})).unwrap();
        assert!(bad_weight.validate().is_err());

        let good: UpdateQuestionRequest =
            serde_json::from_value(json!({"section_id": "sort", "scoring_weight": 2.0})).unwrap();
        assert!(good.validate().is_ok());
    }

    #[test]
    fn assigned_patch_never_changes_type_or_weight() {
        let patch: UpdateAssignedQuestionRequest =
            serde_json::from_value(json!({"question_type": "TEXT", "text": "x"})).unwrap();
        assert!(patch.changes_type(QuestionType::RatingScale));
        assert!(!patch.changes_type(QuestionType::Text));

        let merged = patch.apply(&rating_body());
        assert_eq!(merged.question_type, QuestionType::RatingScale);
        assert_eq!(merged.scoring_weight, Some(1.0));
    }

    #[test]
    fn section_id_must_be_a_slug() {
        let bad: CreateQuestionRequest = serde_json::from_value(json!({
            "text": "Q",
            "question_type": "TEXT",
            "order": 1,
            "section_id": "Not A Slug"
        }))
        .unwrap();
        assert!(bad.validate().is_err());

        let good: CreateQuestionRequest = serde_json::from_value(json!({
            "text": "Q",
            "question_type": "TEXT",
            "order": 1,
            "section_id": "set_in_order"
        }))
        .unwrap();
        assert!(good.validate().is_ok());
        assert!(good.is_mandatory);
    }
}
