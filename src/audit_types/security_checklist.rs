// src/audit_types/security_checklist.rs

use serde_json::Value;

use super::{
    AuditTypeDefinition, AuditTypeError, QuestionSeed, SectionDef, SeedOptions, options_are_empty,
    percentage, present, unsupported_answer, validate_text_answer,
};
use crate::models::{
    audit_response::ScoredAnswer,
    question::{QuestionBody, QuestionType},
};

/// Pass/fail security checklist: every weighted YES_NO question answered
/// `true` earns its weight.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityChecklistAudit;

const SECTIONS: &[SectionDef] = &[
    SectionDef { id: "physical_security", name: "Physical Security" },
    SectionDef { id: "access_control", name: "Access Control" },
    SectionDef { id: "data_security", name: "Data Security" },
];

const fn check(text: &'static str, order: i32, section_id: &'static str) -> QuestionSeed {
    QuestionSeed {
        text,
        question_type: QuestionType::YesNo,
        options: SeedOptions::Empty,
        order,
        is_mandatory: true,
        section_id: Some(section_id),
        scoring_weight: Some(1.0),
    }
}

const QUESTIONS: &[QuestionSeed] = &[
    check("Are all external doors and windows securely locked?", 1, "physical_security"),
    check("Is the alarm system armed and functional?", 2, "physical_security"),
    check("Are visitor logs properly maintained and reviewed?", 3, "access_control"),
    check("Are all user accounts regularly reviewed for necessity and privilege?", 4, "data_security"),
    QuestionSeed {
        text: "Comments on overall security posture:",
        question_type: QuestionType::Text,
        options: SeedOptions::Empty,
        order: 5,
        is_mandatory: false,
        section_id: None,
        scoring_weight: None,
    },
];

impl AuditTypeDefinition for SecurityChecklistAudit {
    fn key(&self) -> &'static str {
        "SECURITY_CHECKLIST_AUDIT"
    }

    fn name(&self) -> &'static str {
        "Security Checklist Audit"
    }

    fn allowed_question_types(&self) -> &'static [QuestionType] {
        &[QuestionType::YesNo, QuestionType::Text]
    }

    fn default_sections(&self) -> &'static [SectionDef] {
        SECTIONS
    }

    fn default_questions(&self) -> &'static [QuestionSeed] {
        QUESTIONS
    }

    fn validate_options(&self, question: &QuestionBody) -> Result<(), AuditTypeError> {
        if question.question_type == QuestionType::YesNo && !options_are_empty(question.options.as_ref()) {
            return Err(AuditTypeError::InvalidQuestion(
                "YES_NO questions should not have options defined.".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_answer(
        &self,
        answer_value: Option<&Value>,
        question: &QuestionBody,
    ) -> Result<(), AuditTypeError> {
        match question.question_type {
            QuestionType::YesNo => match present(answer_value) {
                None | Some(Value::Bool(_)) => Ok(()),
                Some(_) => Err(AuditTypeError::InvalidAnswer(
                    "Answer for YES_NO must be a boolean or null.".to_string(),
                )),
            },
            QuestionType::Text => validate_text_answer(answer_value),
            other => Err(unsupported_answer(self, other)),
        }
    }

    fn calculate_score(&self, answers: &[ScoredAnswer]) -> Option<f64> {
        let mut achieved = 0.0;
        let mut total = 0.0;

        for answer in answers {
            if answer.question.question_type != QuestionType::YesNo {
                continue;
            }
            let Some(weight) = answer.question.scoring_weight.filter(|w| w.is_finite()) else {
                continue;
            };

            total += weight;
            if answer.answer_value == Some(Value::Bool(true)) {
                achieved += weight;
            }
        }

        Some(percentage(achieved, total))
    }
}
