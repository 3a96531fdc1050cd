// src/handlers/audit_templates.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    audit_types::AuditTypeRegistry,
    error::{AppError, map_write_error},
    models::{
        ListParams, Page,
        audit_template::{
            AuditTemplate, AuditTemplateDetail, AuditTypeSummary, CreateTemplateRequest,
            UpdateTemplateRequest,
        },
        question::{CreateQuestionRequest, QuestionBody, QuestionTemplate, UpdateQuestionRequest},
    },
    utils::{html::clean_optional, jwt::Claims},
};

/// Lists every registered audit type with its allowed question types and
/// default sections.
pub async fn list_audit_types(
    State(registry): State<Arc<AuditTypeRegistry>>,
) -> impl IntoResponse {
    let types: Vec<AuditTypeSummary> = registry.iter().map(AuditTypeSummary::of).collect();
    Json(types)
}

pub(crate) async fn fetch_template(pool: &PgPool, id: i64) -> Result<AuditTemplate, AppError> {
    sqlx::query_as::<_, AuditTemplate>("SELECT * FROM audit_templates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Audit template not found".to_string()))
}

async fn fetch_questions<'e>(
    executor: impl PgExecutor<'e>,
    template_id: i64,
) -> Result<Vec<QuestionTemplate>, sqlx::Error> {
    sqlx::query_as::<_, QuestionTemplate>(
        r#"SELECT * FROM question_templates WHERE audit_template_id = $1 ORDER BY "order", id"#,
    )
    .bind(template_id)
    .fetch_all(executor)
    .await
}

async fn insert_question<'e>(
    executor: impl PgExecutor<'e>,
    template_id: i64,
    body: &QuestionBody,
) -> Result<QuestionTemplate, sqlx::Error> {
    sqlx::query_as::<_, QuestionTemplate>(
        r#"
        INSERT INTO question_templates
            (audit_template_id, text, question_type, options, "order", is_mandatory, section_id, scoring_weight)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(template_id)
    .bind(&body.text)
    .bind(body.question_type)
    .bind(&body.options)
    .bind(body.order)
    .bind(body.is_mandatory)
    .bind(&body.section_id)
    .bind(body.scoring_weight)
    .fetch_one(executor)
    .await
}

pub async fn list_templates(
    State(pool): State<PgPool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let templates = sqlx::query_as::<_, AuditTemplate>(
        "SELECT * FROM audit_templates ORDER BY name LIMIT $1 OFFSET $2",
    )
    .bind(params.limit())
    .bind(params.skip())
    .fetch_all(&pool)
    .await?;

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_templates")
        .fetch_one(&pool)
        .await?;

    Ok(Json(Page { data: templates, count }))
}

/// A template with its questions in display order.
pub async fn get_template(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let template = fetch_template(&pool, id).await?;
    let question_templates = fetch_questions(&pool, id).await?;

    Ok(Json(AuditTemplateDetail {
        template,
        question_templates,
    }))
}

pub async fn list_template_questions(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_template(&pool, id).await?;
    Ok(Json(fetch_questions(&pool, id).await?))
}

async fn fetch_question(
    pool: &PgPool,
    template_id: i64,
    question_id: i64,
) -> Result<QuestionTemplate, AppError> {
    sqlx::query_as::<_, QuestionTemplate>(
        "SELECT * FROM question_templates WHERE id = $1 AND audit_template_id = $2",
    )
    .bind(question_id)
    .bind(template_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))
}

pub async fn get_template_question(
    State(pool): State<PgPool>,
    Path((template_id, question_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_question(&pool, template_id, question_id).await?))
}

/// Creates a template and seeds the default questions of its audit type.
/// Admin only.
///
/// The key is resolved before anything is written, and the template and
/// its seeds share one transaction, so a bad key or a bad seed leaves no
/// rows behind.
pub async fn create_template(
    State(pool): State<PgPool>,
    State(registry): State<Arc<AuditTypeRegistry>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let definition = registry.resolve(&payload.audit_type_definition_key)?;
    let created_by_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    let template = sqlx::query_as::<_, AuditTemplate>(
        r#"
        INSERT INTO audit_templates (name, description, audit_type_definition_key, created_by_id)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(clean_optional(payload.description.as_deref()))
    .bind(definition.key())
    .bind(created_by_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        map_write_error(e, || {
            format!("Audit template with name '{}' already exists", payload.name)
        })
    })?;

    let mut question_templates = Vec::with_capacity(definition.default_questions().len());
    for seed in definition.default_questions() {
        let body = seed.to_body();
        definition.validate_question(&body)?;
        question_templates.push(insert_question(&mut *tx, template.id, &body).await?);
    }

    tx.commit().await?;

    tracing::info!(
        template_id = template.id,
        audit_type = definition.key(),
        seeded = question_templates.len(),
        "Audit template created"
    );

    Ok((
        StatusCode::CREATED,
        Json(AuditTemplateDetail {
            template,
            question_templates,
        }),
    ))
}

/// Renames or re-describes a template. The audit type key never changes.
/// Admin only.
pub async fn update_template(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTemplateRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE audit_templates SET ");
    let mut separated = builder.separated(", ");
    separated.push("updated_at = NOW()");

    if let Some(name) = &payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }

    if let Some(description) = clean_optional(payload.description.as_deref()) {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");

    let template = builder
        .build_query_as::<AuditTemplate>()
        .fetch_optional(&pool)
        .await
        .map_err(|e| map_write_error(e, || "An audit template with this name already exists".to_string()))?
        .ok_or(AppError::NotFound("Audit template not found".to_string()))?;

    Ok(Json(template))
}

/// Admin only. Refused while assignments were made from the template.
pub async fn delete_template(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_template(&pool, id).await?;

    let in_use = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM audit_assignments WHERE audit_template_id = $1)",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    if in_use {
        return Err(AppError::BadRequest(
            "Cannot delete an audit template that has assignments".to_string(),
        ));
    }

    sqlx::query("DELETE FROM audit_templates WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    tracing::info!(template_id = id, "Audit template deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Adds a question after checking it against the template's audit type.
/// Admin only.
pub async fn create_question(
    State(pool): State<PgPool>,
    State(registry): State<Arc<AuditTypeRegistry>>,
    Path(template_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let template = fetch_template(&pool, template_id).await?;
    let definition = registry.resolve(&template.audit_type_definition_key)?;

    let body = payload.into_body();
    definition.validate_question(&body)?;

    let question = insert_question(&pool, template_id, &body).await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Patches a question. The merged result is validated as a whole.
/// Admin only.
pub async fn update_question(
    State(pool): State<PgPool>,
    State(registry): State<Arc<AuditTypeRegistry>>,
    Path((template_id, question_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let template = fetch_template(&pool, template_id).await?;
    let definition = registry.resolve(&template.audit_type_definition_key)?;

    let current = fetch_question(&pool, template_id, question_id).await?;

    let body = payload.apply(&current.body);
    definition.validate_question(&body)?;

    let question = sqlx::query_as::<_, QuestionTemplate>(
        r#"
        UPDATE question_templates
        SET text = $1, question_type = $2, options = $3, "order" = $4,
            is_mandatory = $5, section_id = $6, scoring_weight = $7, updated_at = NOW()
        WHERE id = $8
        RETURNING *
        "#,
    )
    .bind(&body.text)
    .bind(body.question_type)
    .bind(&body.options)
    .bind(body.order)
    .bind(body.is_mandatory)
    .bind(&body.section_id)
    .bind(body.scoring_weight)
    .bind(question_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(question))
}

/// Admin only. Assigned snapshots keep their copy of the question.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path((template_id, question_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let result =
        sqlx::query("DELETE FROM question_templates WHERE id = $1 AND audit_template_id = $2")
            .bind(question_id)
            .bind(template_id)
            .execute(&pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
