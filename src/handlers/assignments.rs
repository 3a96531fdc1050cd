// src/handlers/assignments.rs

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
    error::AppError,
    handlers::{
        areas::fetch_area, audit_responses::rescore_submitted, audit_templates::fetch_template,
        companies::fetch_company,
    },
    models::{
        ListParams, Page,
        assignment::{
            AssignmentDetail, AuditAssignment, CreateAssignmentRequest, UpdateAssignmentRequest,
        },
        question::{AssignedQuestion, QuestionType, UpdateAssignedQuestionRequest},
        user::UserRole,
    },
    utils::{access::Viewer, html::clean_optional, jwt::Claims},
};

pub(crate) async fn fetch_assignment(pool: &PgPool, id: i64) -> Result<AuditAssignment, AppError> {
    sqlx::query_as::<_, AuditAssignment>("SELECT * FROM audit_assignments WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Audit assignment not found".to_string()))
}

/// The audit type key of the template an assignment was made from.
pub(crate) async fn definition_key<'e>(
    executor: impl PgExecutor<'e>,
    template_id: i64,
) -> Result<String, AppError> {
    sqlx::query_scalar::<_, String>(
        "SELECT audit_type_definition_key FROM audit_templates WHERE id = $1",
    )
    .bind(template_id)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound("Audit template not found".to_string()))
}

async fn fetch_assigned_questions<'e>(
    executor: impl PgExecutor<'e>,
    assignment_id: i64,
) -> Result<Vec<AssignedQuestion>, sqlx::Error> {
    sqlx::query_as::<_, AssignedQuestion>(
        r#"SELECT * FROM assigned_questions WHERE audit_assignment_id = $1 ORDER BY "order", id"#,
    )
    .bind(assignment_id)
    .fetch_all(executor)
    .await
}

async fn detail(pool: &PgPool, assignment: AuditAssignment) -> Result<AssignmentDetail, AppError> {
    let audit_type_definition_key = definition_key(pool, assignment.audit_template_id).await?;
    let assigned_questions = fetch_assigned_questions(pool, assignment.id).await?;

    Ok(AssignmentDetail {
        assignment,
        audit_type_definition_key,
        assigned_questions,
    })
}

async fn check_area_in_company(pool: &PgPool, area_id: i64, company_id: i64) -> Result<(), AppError> {
    let area = fetch_area(pool, area_id).await?;
    if area.company_id != company_id {
        return Err(AppError::BadRequest(
            "Area does not belong to the assignment's company".to_string(),
        ));
    }
    Ok(())
}

/// Instantiates a template for a company (and optionally one of its areas).
/// Admin only.
///
/// Every template question is copied into the assignment's own snapshot in
/// the same transaction, so later template edits never reach it.
pub async fn create_assignment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    fetch_template(&pool, payload.audit_template_id).await?;
    fetch_company(&pool, payload.company_id).await?;
    if let Some(area_id) = payload.area_id {
        check_area_in_company(&pool, area_id, payload.company_id).await?;
    }

    let created_by_id = claims.user_id()?;

    let mut tx = pool.begin().await?;

    let assignment = sqlx::query_as::<_, AuditAssignment>(
        r#"
        INSERT INTO audit_assignments
            (title, description, due_date, periodicity, next_due_date, is_public,
             audit_template_id, company_id, area_id, created_by_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(&payload.title)
    .bind(clean_optional(payload.description.as_deref()))
    .bind(payload.due_date)
    .bind(payload.periodicity)
    .bind(payload.next_due_date)
    .bind(payload.is_public)
    .bind(payload.audit_template_id)
    .bind(payload.company_id)
    .bind(payload.area_id)
    .bind(created_by_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create assignment: {:?}", e);
        AppError::from(e)
    })?;

    let cloned = sqlx::query(
        r#"
        INSERT INTO assigned_questions
            (audit_assignment_id, original_question_template_id, text, question_type, options,
             "order", is_mandatory, section_id, scoring_weight)
        SELECT $1, id, text, question_type, options, "order", is_mandatory, section_id, scoring_weight
        FROM question_templates
        WHERE audit_template_id = $2
        ORDER BY "order", id
        "#,
    )
    .bind(assignment.id)
    .bind(assignment.audit_template_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let audit_type_definition_key = definition_key(&mut *tx, assignment.audit_template_id).await?;
    let assigned_questions = fetch_assigned_questions(&mut *tx, assignment.id).await?;

    tx.commit().await?;

    tracing::info!(
        assignment_id = assignment.id,
        template_id = assignment.audit_template_id,
        company_id = assignment.company_id,
        cloned,
        "Audit assignment created"
    );

    Ok((
        StatusCode::CREATED,
        Json(AssignmentDetail {
            assignment,
            audit_type_definition_key,
            assigned_questions,
        }),
    ))
}

/// Every assignment in the system.
/// Admin only.
pub async fn list_all_assignments(
    State(pool): State<PgPool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let assignments = sqlx::query_as::<_, AuditAssignment>(
        "SELECT * FROM audit_assignments ORDER BY id DESC LIMIT $1 OFFSET $2",
    )
    .bind(params.limit())
    .bind(params.skip())
    .fetch_all(&pool)
    .await?;

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_assignments")
        .fetch_one(&pool)
        .await?;

    Ok(Json(Page { data: assignments, count }))
}

/// One page of assignments.
///
/// `company_id` narrows to one tenant. `area_ids` applies the member
/// visibility rule of `Viewer::can_access_assignment`; `None` skips it.
async fn list_visible(
    pool: &PgPool,
    company_id: Option<i64>,
    area_ids: Option<Vec<i64>>,
    params: &ListParams,
) -> Result<Page<AuditAssignment>, AppError> {
    let filter = r#"
        WHERE ($1::BIGINT IS NULL OR company_id = $1)
          AND ($2::BIGINT[] IS NULL OR is_public OR area_id IS NULL OR area_id = ANY($2))
    "#;

    let data = sqlx::query_as::<_, AuditAssignment>(&format!(
        "SELECT * FROM audit_assignments {filter} ORDER BY id DESC LIMIT $3 OFFSET $4"
    ))
    .bind(company_id)
    .bind(&area_ids)
    .bind(params.limit())
    .bind(params.skip())
    .fetch_all(pool)
    .await?;

    let count = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM audit_assignments {filter}"
    ))
    .bind(company_id)
    .bind(&area_ids)
    .fetch_one(pool)
    .await?;

    Ok(Page { data, count })
}

/// Assignments the caller may work on.
///
/// Admins get everything and auditors get what is visible in their company.
/// Plain users get an empty page.
pub async fn list_assignments(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;

    let page = match (viewer.user.role, viewer.user.company_id) {
        (UserRole::Admin, _) => list_visible(&pool, None, None, &params).await?,
        (UserRole::Auditor, Some(company_id)) => {
            list_visible(&pool, Some(company_id), Some(viewer.area_ids), &params).await?
        }
        _ => Page {
            data: Vec::new(),
            count: 0,
        },
    };

    Ok(Json(page))
}

/// Assignments of one company. Members of the company see what is visible
/// to them; admins see all of it.
pub async fn list_company_assignments(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(company_id): Path<i64>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    viewer.require_company(company_id)?;
    fetch_company(&pool, company_id).await?;

    let area_ids = (!viewer.is_admin()).then_some(viewer.area_ids);

    Ok(Json(list_visible(&pool, Some(company_id), area_ids, &params).await?))
}

/// An assignment with its question snapshot and audit type key.
pub async fn get_assignment(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    let assignment = fetch_assignment(&pool, id).await?;
    viewer.require_assignment(&assignment)?;

    Ok(Json(detail(&pool, assignment).await?))
}

pub async fn list_assignment_questions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    let assignment = fetch_assignment(&pool, id).await?;
    viewer.require_assignment(&assignment)?;

    Ok(Json(fetch_assigned_questions(&pool, id).await?))
}

/// Admin only. The template and company of an assignment never change.
pub async fn update_assignment(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let current = fetch_assignment(&pool, id).await?;
    if payload.is_empty() {
        return Ok(Json(detail(&pool, current).await?));
    }

    if let Some(Some(area_id)) = payload.area_id {
        check_area_in_company(&pool, area_id, current.company_id).await?;
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE audit_assignments SET ");
    let mut separated = builder.separated(", ");
    separated.push("updated_at = NOW()");

    if let Some(title) = &payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(description) = clean_optional(payload.description.as_deref()) {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }

    if let Some(due_date) = payload.due_date {
        separated.push("due_date = ");
        separated.push_bind_unseparated(due_date);
    }

    if let Some(status) = payload.status {
        separated.push("status = ");
        separated.push_bind_unseparated(status);
    }

    if let Some(periodicity) = payload.periodicity {
        separated.push("periodicity = ");
        separated.push_bind_unseparated(periodicity);
    }

    if let Some(next_due_date) = payload.next_due_date {
        separated.push("next_due_date = ");
        separated.push_bind_unseparated(next_due_date);
    }

    if let Some(area_id) = payload.area_id {
        separated.push("area_id = ");
        separated.push_bind_unseparated(area_id);
    }

    if let Some(is_public) = payload.is_public {
        separated.push("is_public = ");
        separated.push_bind_unseparated(is_public);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");

    let assignment = builder
        .build_query_as::<AuditAssignment>()
        .fetch_one(&pool)
        .await?;

    Ok(Json(detail(&pool, assignment).await?))
}

/// Admin only. Removes the snapshot and every response with it.
pub async fn delete_assignment(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM audit_assignments WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Audit assignment not found".to_string()));
    }

    tracing::info!(assignment_id = id, "Audit assignment deleted");

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_assigned_question<'e>(
    executor: impl PgExecutor<'e>,
    assignment_id: i64,
    question_id: i64,
) -> Result<AssignedQuestion, AppError> {
    sqlx::query_as::<_, AssignedQuestion>(
        "SELECT * FROM assigned_questions WHERE id = $1 AND audit_assignment_id = $2",
    )
    .bind(question_id)
    .bind(assignment_id)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound("Assigned question not found".to_string()))
}

pub async fn get_assigned_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((assignment_id, question_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    let assignment = fetch_assignment(&pool, assignment_id).await?;
    viewer.require_assignment(&assignment)?;

    Ok(Json(fetch_assigned_question(&pool, assignment_id, question_id).await?))
}

/// Edits one question of an assignment's snapshot.
/// Admin only.
///
/// The question type is frozen. Scored types are re-checked against the
/// assignment's audit type after the patch is merged, and submitted
/// responses are re-scored in the same transaction.
pub async fn update_assigned_question(
    State(pool): State<PgPool>,
    State(registry): State<Arc<AuditTypeRegistry>>,
    Path((assignment_id, question_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateAssignedQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let assignment = fetch_assignment(&pool, assignment_id).await?;
    let current = fetch_assigned_question(&pool, assignment_id, question_id).await?;

    if payload.changes_type(current.body.question_type) {
        return Err(AppError::BadRequest(
            "The question_type of an assigned question cannot be changed".to_string(),
        ));
    }

    let body = payload.apply(&current.body);

    let key = definition_key(&pool, assignment.audit_template_id).await?;
    let definition = registry.resolve(&key)?;
    if matches!(
        body.question_type,
        QuestionType::RatingScale | QuestionType::YesNo
    ) {
        definition.validate_question(&body)?;
    }

    let mut tx = pool.begin().await?;

    let question = sqlx::query_as::<_, AssignedQuestion>(
        r#"
        UPDATE assigned_questions
        SET text = $1, options = $2, "order" = $3, is_mandatory = $4, section_id = $5,
            updated_at = NOW()
        WHERE id = $6
        RETURNING *
        "#,
    )
    .bind(&body.text)
    .bind(&body.options)
    .bind(body.order)
    .bind(body.is_mandatory)
    .bind(&body.section_id)
    .bind(question_id)
    .fetch_one(&mut *tx)
    .await?;

    rescore_submitted(&mut tx, definition, assignment_id).await?;

    tx.commit().await?;

    Ok(Json(question))
}

/// Admin only. Answers to the question go with it and submitted responses
/// are re-scored without them.
pub async fn delete_assigned_question(
    State(pool): State<PgPool>,
    State(registry): State<Arc<AuditTypeRegistry>>,
    Path((assignment_id, question_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let assignment = fetch_assignment(&pool, assignment_id).await?;
    let key = definition_key(&pool, assignment.audit_template_id).await?;
    let definition = registry.resolve(&key)?;

    let mut tx = pool.begin().await?;

    let result =
        sqlx::query("DELETE FROM assigned_questions WHERE id = $1 AND audit_assignment_id = $2")
            .bind(question_id)
            .bind(assignment_id)
            .execute(&mut *tx)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Assigned question not found".to_string()));
    }

    rescore_submitted(&mut tx, definition, assignment_id).await?;

    tx.commit().await?;

    tracing::info!(assignment_id, question_id, "Assigned question deleted");

    Ok(StatusCode::NO_CONTENT)
}
