// src/handlers/areas.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::{AppError, map_write_error},
    handlers::companies::fetch_company,
    models::area::{Area, CreateAreaRequest, UpdateAreaRequest},
    utils::{access::Viewer, html::clean_optional, jwt::Claims},
};

pub(crate) async fn fetch_area(pool: &PgPool, id: i64) -> Result<Area, AppError> {
    sqlx::query_as::<_, Area>("SELECT * FROM areas WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Area not found".to_string()))
}

/// Areas of a company.
///
/// Admins see all of them. Members see the areas they are assigned to, or
/// every area of their company when they have no assignment.
pub async fn list_company_areas(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(company_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    viewer.require_company(company_id)?;

    let areas = if viewer.is_admin() || viewer.area_ids.is_empty() {
        sqlx::query_as::<_, Area>("SELECT * FROM areas WHERE company_id = $1 ORDER BY name")
            .bind(company_id)
            .fetch_all(&pool)
            .await?
    } else {
        sqlx::query_as::<_, Area>(
            "SELECT * FROM areas WHERE company_id = $1 AND id = ANY($2) ORDER BY name",
        )
        .bind(company_id)
        .bind(&viewer.area_ids)
        .fetch_all(&pool)
        .await?
    };

    Ok(Json(areas))
}

pub async fn get_area(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    let area = fetch_area(&pool, id).await?;
    viewer.require_company(area.company_id)?;

    Ok(Json(area))
}

/// Admin only.
pub async fn create_area(
    State(pool): State<PgPool>,
    Path(company_id): Path<i64>,
    Json(payload): Json<CreateAreaRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    fetch_company(&pool, company_id).await?;

    let area = sqlx::query_as::<_, Area>(
        r#"
        INSERT INTO areas (company_id, name, description)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(company_id)
    .bind(&payload.name)
    .bind(clean_optional(payload.description.as_deref()))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        map_write_error(e, || {
            format!("Area '{}' already exists in this company", payload.name)
        })
    })?;

    tracing::info!(area_id = area.id, company_id, "Area created");

    Ok((StatusCode::CREATED, Json(area)))
}

/// Admin only.
pub async fn update_area(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAreaRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE areas SET ");
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

    let area = builder
        .build_query_as::<Area>()
        .fetch_optional(&pool)
        .await
        .map_err(|e| map_write_error(e, || "An area with this name already exists in this company".to_string()))?
        .ok_or(AppError::NotFound("Area not found".to_string()))?;

    Ok(Json(area))
}

/// Admin only. Refused while audit assignments target the area.
pub async fn delete_area(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    fetch_area(&pool, id).await?;

    let has_assignments = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM audit_assignments WHERE area_id = $1)",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;

    if has_assignments {
        return Err(AppError::BadRequest(
            "Cannot delete an area that still has audit assignments".to_string(),
        ));
    }

    sqlx::query("DELETE FROM areas WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
