// src/audit_types/five_s.rs

use serde_json::Value;

use super::{
    AuditTypeDefinition, AuditTypeError, QuestionSeed, SectionDef, SeedOptions, coerce_f64,
    percentage, present, unsupported_answer, validate_text_answer,
};
use crate::models::{
    audit_response::ScoredAnswer,
    question::{QuestionBody, QuestionType},
};

/// 5S workplace-organisation audit: weighted rating scales plus free text.
#[derive(Debug, Default, Clone, Copy)]
pub struct FiveSAudit;

const SECTIONS: &[SectionDef] = &[
    SectionDef { id: "sort", name: "Sort (Seiri)" },
    SectionDef { id: "set_in_order", name: "Set in Order (Seiton)" },
    SectionDef { id: "shine", name: "Shine (Seiso)" },
    SectionDef { id: "standardize", name: "Standardize (Seiketsu)" },
    SectionDef { id: "sustain", name: "Sustain (Shitsuke)" },
];

const ONE_TO_FIVE: SeedOptions = SeedOptions::Rating { min: 1, max: 5, step: 1 };

const fn rated(text: &'static str, order: i32, section_id: &'static str) -> QuestionSeed {
    QuestionSeed {
        text,
        question_type: QuestionType::RatingScale,
        options: ONE_TO_FIVE,
        order,
        is_mandatory: true,
        section_id: Some(section_id),
        scoring_weight: Some(1.0),
    }
}

const QUESTIONS: &[QuestionSeed] = &[
    rated("Are unnecessary items removed from the workplace?", 1, "sort"),
    rated("Are all items in their designated places and clearly labeled?", 2, "set_in_order"),
    rated("Is the workplace clean and free of dirt and debris?", 3, "shine"),
    rated("Are standards for cleanliness and organization established and followed?", 4, "standardize"),
    rated("Are 5S principles regularly reviewed and improved upon?", 5, "sustain"),
    QuestionSeed {
        text: "General comments on 5S implementation:",
        question_type: QuestionType::Text,
        options: SeedOptions::Empty,
        order: 6,
        is_mandatory: false,
        section_id: None,
        scoring_weight: None,
    },
];

impl AuditTypeDefinition for FiveSAudit {
    fn key(&self) -> &'static str {
        "FIVE_S_AUDIT"
    }

    fn name(&self) -> &'static str {
        "5S Audit"
    }

    fn allowed_question_types(&self) -> &'static [QuestionType] {
        &[QuestionType::RatingScale, QuestionType::Text]
    }

    fn default_sections(&self) -> &'static [SectionDef] {
        SECTIONS
    }

    fn default_questions(&self) -> &'static [QuestionSeed] {
        QUESTIONS
    }

    fn validate_options(&self, question: &QuestionBody) -> Result<(), AuditTypeError> {
        if question.question_type != QuestionType::RatingScale {
            return Ok(());
        }

        let Some(Value::Object(options)) = present(question.options.as_ref()) else {
            return Err(missing_bounds());
        };
        let (Some(min), Some(max)) = (options.get("min"), options.get("max")) else {
            return Err(missing_bounds());
        };
        let (Some(min), Some(max)) = (min.as_f64(), max.as_f64()) else {
            return Err(AuditTypeError::InvalidQuestion(
                "Rating scale 'min' and 'max' must be numeric.".to_string(),
            ));
        };
        if min >= max {
            return Err(AuditTypeError::InvalidQuestion(
                "Rating scale 'min' must be less than 'max'.".to_string(),
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
            QuestionType::RatingScale => validate_rating(present(answer_value), question),
            QuestionType::Text => validate_text_answer(answer_value),
            other => Err(unsupported_answer(self, other)),
        }
    }

    fn calculate_score(&self, answers: &[ScoredAnswer]) -> Option<f64> {
        let mut achieved = 0.0;
        let mut max_possible = 0.0;

        for answer in answers {
            let question = &answer.question;
            if question.question_type != QuestionType::RatingScale {
                continue;
            }
            let Some(weight) = question.scoring_weight.filter(|w| w.is_finite()) else {
                continue;
            };
            let Some(max) = rating_bound(question, "max") else {
                continue;
            };

            max_possible += max * weight;
            if let Some(value) = present(answer.answer_value.as_ref()).and_then(Value::as_f64) {
                achieved += value * weight;
            }
        }

        Some(percentage(achieved, max_possible))
    }
}

fn missing_bounds() -> AuditTypeError {
    AuditTypeError::InvalidQuestion(
        "Rating scale questions must define 'min' and 'max' in options.".to_string(),
    )
}

fn rating_bound(question: &QuestionBody, name: &str) -> Option<f64> {
    match present(question.options.as_ref()) {
        Some(Value::Object(options)) => present(options.get(name)).and_then(coerce_f64),
        _ => None,
    }
}

fn validate_rating(answer_value: Option<&Value>, question: &QuestionBody) -> Result<(), AuditTypeError> {
    let Some(value) = answer_value else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(AuditTypeError::InvalidAnswer(
            "Answer for rating scale must be a number.".to_string(),
        ));
    };

    let Some(Value::Object(options)) = present(question.options.as_ref()) else {
        return Ok(());
    };
    let (Some(min_raw), Some(max_raw)) = (
        present(options.get("min")),
        present(options.get("max")),
    ) else {
        return Ok(());
    };
    let (Some(min), Some(max)) = (coerce_f64(min_raw), coerce_f64(max_raw)) else {
        return Err(AuditTypeError::InvalidAnswer(
            "Invalid min/max values in question options.".to_string(),
        ));
    };

    if !(min..=max).contains(&number) {
        return Err(AuditTypeError::InvalidAnswer(format!(
            "Answer for rating scale must be between {} and {}.",
            min_raw, max_raw
        )));
    }
    Ok(())
}
