// src/models/audit_template.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    audit_types::{AuditTypeDefinition, SectionDef},
    models::question::{QuestionTemplate, QuestionType},
};

/// Represents the 'audit_templates' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditTemplate {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Selects the audit type definition. Fixed once the template exists.
    pub audit_type_definition_key: String,
    pub created_by_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A template together with its ordered questions.
#[derive(Debug, Serialize)]
pub struct AuditTemplateDetail {
    #[serde(flatten)]
    pub template: AuditTemplate,
    pub question_templates: Vec<QuestionTemplate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub audit_type_definition_key: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTemplateRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
}

/// Public description of a registered audit type.
#[derive(Debug, Serialize)]
pub struct AuditTypeSummary {
    pub key: &'static str,
    pub name: &'static str,
    pub allowed_question_types: &'static [QuestionType],
    pub sections: &'static [SectionDef],
}

impl AuditTypeSummary {
    pub fn of(definition: &dyn AuditTypeDefinition) -> Self {
        Self {
            key: definition.key(),
            name: definition.name(),
            allowed_question_types: definition.allowed_question_types(),
            sections: definition.default_sections(),
        }
    }
}
