// src/audit_types/mod.rs

//! Audit type definitions.
//!
//! Everything that differs between kinds of audit lives behind
//! [`AuditTypeDefinition`]: which question types are legal, which questions
//! a new template starts with, how answers are checked and how a submitted
//! response is scored. Definitions are looked up by key through
//! [`AuditTypeRegistry`].

pub mod five_s;
pub mod registry;
pub mod security_checklist;

use serde::Serialize;
use serde_json::Value;

use crate::models::{
    audit_response::ScoredAnswer,
    question::{QuestionBody, QuestionType},
};

pub use five_s::FiveSAudit;
pub use registry::AuditTypeRegistry;
pub use security_checklist::SecurityChecklistAudit;

/// Failures raised by audit type definitions.
/// These are plain domain values; the HTTP layer decides the status code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuditTypeError {
    #[error("Invalid audit_type_definition_key '{0}'")]
    UnknownType(String),

    #[error("{0}")]
    InvalidQuestion(String),

    #[error("{0}")]
    InvalidAnswer(String),
}

/// Grouping metadata surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SectionDef {
    pub id: &'static str,
    pub name: &'static str,
}

/// Option payloads a seed question can carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeedOptions {
    Empty,
    Rating { min: i64, max: i64, step: i64 },
}

impl SeedOptions {
    pub fn to_json(self) -> Value {
        match self {
            SeedOptions::Empty => serde_json::json!({}),
            SeedOptions::Rating { min, max, step } => {
                serde_json::json!({ "min": min, "max": max, "step": step })
            }
        }
    }
}

/// A question inserted automatically when a template of a given type is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionSeed {
    pub text: &'static str,
    pub question_type: QuestionType,
    pub options: SeedOptions,
    pub order: i32,
    pub is_mandatory: bool,
    pub section_id: Option<&'static str>,
    pub scoring_weight: Option<f64>,
}

impl QuestionSeed {
    pub fn to_body(&self) -> QuestionBody {
        QuestionBody {
            text: self.text.to_string(),
            question_type: self.question_type,
            options: Some(self.options.to_json()),
            order: self.order,
            is_mandatory: self.is_mandatory,
            section_id: self.section_id.map(str::to_string),
            scoring_weight: self.scoring_weight,
        }
    }
}

/// Behaviour of one audit type.
///
/// Implementations are stateless and never perform I/O, so they can be
/// shared freely between requests.
pub trait AuditTypeDefinition: Send + Sync {
    /// Stable identifier stored on templates.
    fn key(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn allowed_question_types(&self) -> &'static [QuestionType];

    fn default_sections(&self) -> &'static [SectionDef] {
        &[]
    }

    fn default_questions(&self) -> &'static [QuestionSeed] {
        &[]
    }

    /// Type-specific structural rules on `options`.
    /// Only called once the question type is known to be allowed.
    fn validate_options(&self, question: &QuestionBody) -> Result<(), AuditTypeError>;

    /// Checks a question before it is persisted.
    fn validate_question(&self, question: &QuestionBody) -> Result<(), AuditTypeError> {
        if !self.allowed_question_types().contains(&question.question_type) {
            return Err(AuditTypeError::InvalidQuestion(format!(
                "Question type {} not allowed for {}. Allowed types are: {}",
                question.question_type,
                self.name(),
                join_types(self.allowed_question_types()),
            )));
        }
        if question.question_type.is_multiple_choice() {
            let has_labels = matches!(&question.options, Some(Value::Array(items)) if !items.is_empty());
            if !has_labels {
                return Err(AuditTypeError::InvalidQuestion(
                    "Multiple choice questions must have a non-empty list of options.".to_string(),
                ));
            }
        }
        self.validate_options(question)
    }

    /// Checks an answer value against the assigned question it answers.
    /// `None` and JSON `null` both mean "not answered".
    fn validate_answer(
        &self,
        answer_value: Option<&Value>,
        question: &QuestionBody,
    ) -> Result<(), AuditTypeError>;

    /// Normalised 0-100 score of a response, or `None` when the type does
    /// not score.
    fn calculate_score(&self, answers: &[ScoredAnswer]) -> Option<f64>;
}

fn join_types(types: &[QuestionType]) -> String {
    types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Treats JSON `null` the same as a missing value.
pub(crate) fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Absent, null, `{}`, `[]` and `""` all count as "no options".
pub(crate) fn options_are_empty(options: Option<&Value>) -> bool {
    match present(options) {
        None => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Reads a number out of an options payload, accepting numeric strings.
pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn validate_text_answer(answer_value: Option<&Value>) -> Result<(), AuditTypeError> {
    match present(answer_value) {
        None | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(AuditTypeError::InvalidAnswer(
            "Answer for text question must be a string or null.".to_string(),
        )),
    }
}

pub(crate) fn unsupported_answer(
    definition: &dyn AuditTypeDefinition,
    question_type: QuestionType,
) -> AuditTypeError {
    AuditTypeError::InvalidAnswer(format!(
        "Questions of type {} cannot be answered in {} audits.",
        question_type,
        definition.name()
    ))
}

pub(crate) fn percentage(achieved: f64, possible: f64) -> f64 {
    if possible > 0.0 {
        achieved / possible * 100.0
    } else {
        0.0
    }
}
