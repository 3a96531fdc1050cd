// src/handlers/companies.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::{AppError, map_write_error},
    models::{
        ListParams, Page,
        company::{Company, CreateCompanyRequest, UpdateCompanyRequest},
    },
    utils::{access::Viewer, html::clean_optional, jwt::Claims},
};

pub(crate) async fn fetch_company(pool: &PgPool, id: i64) -> Result<Company, AppError> {
    sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Company not found".to_string()))
}

/// Members read their own company; admins read any.
pub async fn get_company(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    viewer.require_company(id)?;

    Ok(Json(fetch_company(&pool, id).await?))
}

/// Admin only.
pub async fn list_companies(
    State(pool): State<PgPool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let companies =
        sqlx::query_as::<_, Company>("SELECT * FROM companies ORDER BY name LIMIT $1 OFFSET $2")
            .bind(params.limit())
            .bind(params.skip())
            .fetch_all(&pool)
            .await?;

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM companies")
        .fetch_one(&pool)
        .await?;

    Ok(Json(Page { data: companies, count }))
}

/// Admin only.
pub async fn create_company(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateCompanyRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let company = sqlx::query_as::<_, Company>(
        r#"
        INSERT INTO companies (name, details, is_demo)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(&payload.name)
    .bind(clean_optional(payload.details.as_deref()))
    .bind(payload.is_demo)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        map_write_error(e, || {
            format!("Company with name '{}' already exists", payload.name)
        })
    })?;

    tracing::info!(company_id = company.id, "Company created");

    Ok((StatusCode::CREATED, Json(company)))
}

/// Admin only.
pub async fn update_company(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCompanyRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE companies SET ");
    let mut separated = builder.separated(", ");
    separated.push("updated_at = NOW()");

    if let Some(name) = &payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }

    if let Some(details) = clean_optional(payload.details.as_deref()) {
        separated.push("details = ");
        separated.push_bind_unseparated(details);
    }

    if let Some(is_demo) = payload.is_demo {
        separated.push("is_demo = ");
        separated.push_bind_unseparated(is_demo);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");

    let company = builder
        .build_query_as::<Company>()
        .fetch_optional(&pool)
        .await
        .map_err(|e| map_write_error(e, || "A company with this name already exists".to_string()))?
        .ok_or(AppError::NotFound("Company not found".to_string()))?;

    Ok(Json(company))
}

/// Admin only. Refused while audit assignments still point at the company.
pub async fn delete_company(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_company(&pool, id).await?;

    let has_assignments = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM audit_assignments WHERE company_id = $1)",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    if has_assignments {
        return Err(AppError::BadRequest(
            "Cannot delete a company that still has audit assignments".to_string(),
        ));
    }

    // Auditors and users cannot exist without a company.
    let has_members = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE company_id = $1 AND role <> 'ADMIN')",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    if has_members {
        return Err(AppError::BadRequest(
            "Cannot delete a company that still has users".to_string(),
        ));
    }

    sqlx::query("DELETE FROM companies WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    tracing::info!(company_id = id, "Company deleted");

    Ok(StatusCode::NO_CONTENT)
}
