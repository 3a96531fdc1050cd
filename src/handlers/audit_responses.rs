// src/handlers/audit_responses.rs

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder, types::Json as SqlJson};
use validator::Validate;

use crate::{
    audit_types::{AuditTypeDefinition, AuditTypeRegistry},
    error::AppError,
    handlers::assignments::{definition_key, fetch_assignment},
    models::{
        assignment::{AssignmentStatus, AuditAssignment},
        audit_response::{
            Answer, AnswerInput, AuditResponse, CreateResponseRequest, ResponseDetail,
            ResponseStatus, ScoredAnswer, UpdateResponseRequest,
        },
        question::QuestionBody,
    },
    utils::{access::Viewer, html::clean_optional, jwt::Claims},
};

/// Checks a batch of answers against the assignment's snapshot: every
/// answer must target a distinct question of the assignment and carry a
/// value the audit type accepts.
pub fn check_answers(
    definition: &dyn AuditTypeDefinition,
    questions: &HashMap<i64, QuestionBody>,
    answers: &[AnswerInput],
) -> Result<(), AppError> {
    let mut seen = HashSet::with_capacity(answers.len());

    for answer in answers {
        if !seen.insert(answer.assigned_question_id) {
            return Err(AppError::BadRequest(format!(
                "Duplicate answer for assigned question {}",
                answer.assigned_question_id
            )));
        }

        let question = questions.get(&answer.assigned_question_id).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Assigned question {} does not belong to this audit assignment",
                answer.assigned_question_id
            ))
        })?;

        definition.validate_answer(answer.answer_value.as_ref(), question)?;
    }

    Ok(())
}

/// A draft never has a score; a submitted response is scored over its full
/// answer set.
pub fn resolve_score(
    definition: &dyn AuditTypeDefinition,
    status: ResponseStatus,
    answers: &[ScoredAnswer],
) -> Option<f64> {
    match status {
        ResponseStatus::Draft => None,
        ResponseStatus::Submitted => definition.calculate_score(answers),
    }
}

async fn snapshot_questions<'e>(
    executor: impl PgExecutor<'e>,
    assignment_id: i64,
) -> Result<HashMap<i64, QuestionBody>, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct Row {
        id: i64,
        #[sqlx(flatten)]
        body: QuestionBody,
    }

    let rows = sqlx::query_as::<_, Row>(
        r#"
        SELECT id, text, question_type, options, "order", is_mandatory, section_id, scoring_weight
        FROM assigned_questions
        WHERE audit_assignment_id = $1
        "#,
    )
    .bind(assignment_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|row| (row.id, row.body)).collect())
}

async fn fetch_answers<'e>(
    executor: impl PgExecutor<'e>,
    response_ids: &[i64],
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(
        "SELECT * FROM answers WHERE audit_response_id = ANY($1) ORDER BY assigned_question_id",
    )
    .bind(response_ids)
    .fetch_all(executor)
    .await
}

async fn upsert_answers(
    conn: &mut PgConnection,
    response_id: i64,
    answers: &[AnswerInput],
) -> Result<(), sqlx::Error> {
    for answer in answers {
        sqlx::query(
            r#"
            INSERT INTO answers (audit_response_id, assigned_question_id, answer_value, comments, photo_urls)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (audit_response_id, assigned_question_id) DO UPDATE
            SET answer_value = EXCLUDED.answer_value,
                comments = EXCLUDED.comments,
                photo_urls = EXCLUDED.photo_urls,
                updated_at = NOW()
            "#,
        )
        .bind(response_id)
        .bind(answer.assigned_question_id)
        .bind(answer.answer_value.as_ref().filter(|value| !value.is_null()))
        .bind(clean_optional(answer.comments.as_deref()))
        .bind(SqlJson(answer.photo_urls.clone().unwrap_or_default()))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Scores a response from the answers and snapshot questions currently stored.
async fn stored_score(
    conn: &mut PgConnection,
    definition: &dyn AuditTypeDefinition,
    response_id: i64,
    status: ResponseStatus,
) -> Result<Option<f64>, AppError> {
    let scored = sqlx::query_as::<_, ScoredAnswer>(
        r#"
        SELECT a.answer_value, q.text, q.question_type, q.options, q."order",
               q.is_mandatory, q.section_id, q.scoring_weight
        FROM answers a
        JOIN assigned_questions q ON q.id = a.assigned_question_id
        WHERE a.audit_response_id = $1
        "#,
    )
    .bind(response_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(resolve_score(definition, status, &scored))
}

/// Re-scores every submitted response of an assignment after its snapshot
/// questions changed. Drafts carry no score and are left alone.
pub(crate) async fn rescore_submitted(
    conn: &mut PgConnection,
    definition: &dyn AuditTypeDefinition,
    assignment_id: i64,
) -> Result<(), AppError> {
    let response_ids = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM audit_responses WHERE audit_assignment_id = $1 AND status = $2",
    )
    .bind(assignment_id)
    .bind(ResponseStatus::Submitted)
    .fetch_all(&mut *conn)
    .await?;

    for response_id in response_ids {
        let score = stored_score(&mut *conn, definition, response_id, ResponseStatus::Submitted).await?;

        sqlx::query("UPDATE audit_responses SET score = $1, updated_at = NOW() WHERE id = $2")
            .bind(score)
            .bind(response_id)
            .execute(&mut *conn)
            .await?;

        tracing::info!(response_id, assignment_id, score, "Audit response rescored");
    }

    Ok(())
}

/// Recomputes the stored score from what is now in the database and moves
/// the assignment along: a draft starts it, a submission completes it.
async fn finalize(
    conn: &mut PgConnection,
    definition: &dyn AuditTypeDefinition,
    response_id: i64,
    assignment: &AuditAssignment,
) -> Result<ResponseDetail, AppError> {
    let status = sqlx::query_scalar::<_, ResponseStatus>(
        "SELECT status FROM audit_responses WHERE id = $1",
    )
    .bind(response_id)
    .fetch_one(&mut *conn)
    .await?;

    let score = stored_score(&mut *conn, definition, response_id, status).await?;
    let submitted = status == ResponseStatus::Submitted;

    let response = sqlx::query_as::<_, AuditResponse>(
        r#"
        UPDATE audit_responses
        SET score = $1,
            submission_date = CASE WHEN $2 THEN COALESCE(submission_date, NOW()) ELSE NULL END,
            updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(score)
    .bind(submitted)
    .bind(response_id)
    .fetch_one(&mut *conn)
    .await?;

    let next_status = if submitted {
        Some(AssignmentStatus::Completed)
    } else if assignment.status == AssignmentStatus::Pending {
        Some(AssignmentStatus::InProgress)
    } else {
        None
    };

    if let Some(next_status) = next_status {
        sqlx::query("UPDATE audit_assignments SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(next_status)
            .bind(assignment.id)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(score) = score {
        tracing::info!(response_id, assignment_id = assignment.id, score, "Audit response scored");
    }

    let answers = fetch_answers(&mut *conn, &[response_id]).await?;

    Ok(ResponseDetail { response, answers })
}

/// Starts or submits a response to an assignment.
/// Auditors with access to the assignment only.
pub async fn create_response(
    State(pool): State<PgPool>,
    State(registry): State<Arc<AuditTypeRegistry>>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<i64>,
    Json(payload): Json<CreateResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    let assignment = fetch_assignment(&pool, assignment_id).await?;

    if !viewer.can_respond(&assignment) {
        return Err(AppError::Forbidden(
            "Only auditors with access to this assignment can respond to it".to_string(),
        ));
    }

    payload.validate()?;

    let key = definition_key(&pool, assignment.audit_template_id).await?;
    let definition = registry.resolve(&key)?;

    let mut tx = pool.begin().await?;

    let questions = snapshot_questions(&mut *tx, assignment_id).await?;
    check_answers(definition, &questions, &payload.answers)?;

    let response_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO audit_responses (audit_assignment_id, auditor_id, status, overall_comments, photo_urls)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(assignment_id)
    .bind(viewer.user.id)
    .bind(payload.status)
    .bind(clean_optional(payload.overall_comments.as_deref()))
    .bind(SqlJson(payload.photo_urls.clone().unwrap_or_default()))
    .fetch_one(&mut *tx)
    .await?;

    upsert_answers(&mut tx, response_id, &payload.answers).await?;
    let detail = finalize(&mut tx, definition, response_id, &assignment).await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// All responses of an assignment, each with its answers.
pub async fn list_responses(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    let assignment = fetch_assignment(&pool, assignment_id).await?;
    viewer.require_assignment(&assignment)?;

    let responses = sqlx::query_as::<_, AuditResponse>(
        "SELECT * FROM audit_responses WHERE audit_assignment_id = $1 ORDER BY id",
    )
    .bind(assignment_id)
    .fetch_all(&pool)
    .await?;

    let ids: Vec<i64> = responses.iter().map(|response| response.id).collect();
    let mut by_response: HashMap<i64, Vec<Answer>> = HashMap::new();
    for answer in fetch_answers(&pool, &ids).await? {
        by_response
            .entry(answer.audit_response_id)
            .or_default()
            .push(answer);
    }

    let details: Vec<ResponseDetail> = responses
        .into_iter()
        .map(|response| {
            let answers = by_response.remove(&response.id).unwrap_or_default();
            ResponseDetail { response, answers }
        })
        .collect();

    Ok(Json(details))
}

async fn fetch_response(
    pool: &PgPool,
    assignment_id: i64,
    response_id: i64,
) -> Result<AuditResponse, AppError> {
    sqlx::query_as::<_, AuditResponse>(
        "SELECT * FROM audit_responses WHERE id = $1 AND audit_assignment_id = $2",
    )
    .bind(response_id)
    .bind(assignment_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Audit response not found".to_string()))
}

pub async fn get_response(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((assignment_id, response_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    let assignment = fetch_assignment(&pool, assignment_id).await?;
    viewer.require_assignment(&assignment)?;

    let response = fetch_response(&pool, assignment_id, response_id).await?;
    let answers = fetch_answers(&pool, &[response.id]).await?;

    Ok(Json(ResponseDetail { response, answers }))
}

/// Edits a response and upserts its answers.
///
/// The author may edit while the response is a draft; admins may edit at
/// any time, including moving it back to draft. Submitted responses are
/// re-scored on every edit.
pub async fn update_response(
    State(pool): State<PgPool>,
    State(registry): State<Arc<AuditTypeRegistry>>,
    Extension(claims): Extension<Claims>,
    Path((assignment_id, response_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    let assignment = fetch_assignment(&pool, assignment_id).await?;
    viewer.require_assignment(&assignment)?;

    let current = fetch_response(&pool, assignment_id, response_id).await?;
    if !viewer.can_edit_response(&current) {
        return Err(AppError::Forbidden(
            "Only the author can edit a draft response; submitted responses are admin-only"
                .to_string(),
        ));
    }

    payload.validate()?;

    let key = definition_key(&pool, assignment.audit_template_id).await?;
    let definition = registry.resolve(&key)?;
    let answers = payload.answers.as_deref().unwrap_or_default();

    let mut tx = pool.begin().await?;

    let questions = snapshot_questions(&mut *tx, assignment_id).await?;
    check_answers(definition, &questions, answers)?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE audit_responses SET ");
    let mut separated = builder.separated(", ");
    separated.push("updated_at = NOW()");

    if let Some(overall_comments) = clean_optional(payload.overall_comments.as_deref()) {
        separated.push("overall_comments = ");
        separated.push_bind_unseparated(overall_comments);
    }

    if let Some(photo_urls) = &payload.photo_urls {
        separated.push("photo_urls = ");
        separated.push_bind_unseparated(SqlJson(photo_urls.clone()));
    }

    if let Some(status) = payload.status {
        separated.push("status = ");
        separated.push_bind_unseparated(status);
        if status == ResponseStatus::Draft {
            separated.push("score = NULL");
        }
    }

    builder.push(" WHERE id = ");
    builder.push_bind(response_id);
    builder.build().execute(&mut *tx).await?;

    upsert_answers(&mut tx, response_id, answers).await?;
    let detail = finalize(&mut tx, definition, response_id, &assignment).await?;

    tx.commit().await?;

    tracing::info!(
        response_id,
        editor_id = viewer.user.id,
        status = ?detail.response.status,
        "Audit response updated"
    );

    Ok(Json(detail))
}
