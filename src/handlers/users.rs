// src/handlers/users.rs

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
    handlers::areas::fetch_area,
    models::{
        ListParams, Page,
        user::{
            AdminCreateUserRequest, AdminUpdateUserRequest, ChangePasswordRequest, MeResponse,
            UpdateMeRequest, User,
        },
    },
    utils::{
        access::Viewer,
        hash::{hash_password, verify_password},
        jwt::Claims,
    },
};

/// Returns the caller's profile and the ids of the areas they are assigned to.
pub async fn me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;

    Ok(Json(MeResponse {
        user: viewer.user,
        area_ids: viewer.area_ids,
    }))
}

/// Updates the caller's own email and name. Absent fields are left unchanged.
pub async fn update_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let viewer = Viewer::load(&pool, &claims).await?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");
    separated.push("updated_at = NOW()");

    if let Some(email) = &payload.email {
        separated.push("email = ");
        separated.push_bind_unseparated(email);
    }

    if let Some(full_name) = &payload.full_name {
        separated.push("full_name = ");
        separated.push_bind_unseparated(full_name);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(viewer.user.id);
    builder.push(" RETURNING *");

    let user = builder
        .build_query_as::<User>()
        .fetch_one(&pool)
        .await
        .map_err(|e| map_write_error(e, || "User with this email already exists".to_string()))?;

    Ok(Json(MeResponse {
        user,
        area_ids: viewer.area_ids,
    }))
}

/// The current password must match and the new one must differ from it.
fn check_password_change(stored_hash: &str, req: &ChangePasswordRequest) -> Result<(), AppError> {
    if !verify_password(&req.current_password, stored_hash)? {
        return Err(AppError::BadRequest("Incorrect password".to_string()));
    }
    if req.current_password == req.new_password {
        return Err(AppError::BadRequest(
            "New password cannot be the same as the current one".to_string(),
        ));
    }
    Ok(())
}

pub async fn change_password(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let viewer = Viewer::load(&pool, &claims).await?;
    check_password_change(&viewer.user.password, &payload)?;

    sqlx::query("UPDATE users SET password = $1, updated_at = NOW() WHERE id = $2")
        .bind(hash_password(&payload.new_password)?)
        .bind(viewer.user.id)
        .execute(&pool)
        .await?;

    tracing::info!(user_id = viewer.user.id, "Password changed");

    Ok(Json(serde_json::json!({ "message": "Password updated successfully" })))
}

/// Deletes the caller's own account. Admins cannot remove themselves.
pub async fn delete_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = Viewer::load(&pool, &claims).await?;
    if viewer.is_admin() {
        return Err(AppError::Forbidden(
            "Admins are not allowed to delete themselves".to_string(),
        ));
    }

    remove_user(&pool, viewer.user.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_user(pool: &PgPool, id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(
    State(pool): State<PgPool>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id LIMIT $1 OFFSET $2")
        .bind(params.limit())
        .bind(params.skip())
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list users: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await?;

    Ok(Json(Page { data: users, count }))
}

/// Admin only.
pub async fn get_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(fetch_user(&pool, id).await?))
}

/// Creates a user with any role.
/// Admin only. Auditors and plain users must belong to a company.
pub async fn create_user(
    State(pool): State<PgPool>,
    Json(payload): Json<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.role.requires_company() && payload.company_id.is_none() {
        return Err(AppError::BadRequest(format!(
            "company_id is required for role {:?}",
            payload.role
        )));
    }

    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, password, full_name, role, company_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&payload.email)
    .bind(hashed_password)
    .bind(&payload.full_name)
    .bind(payload.role)
    .bind(payload.company_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        map_write_error(e, || {
            format!("A user with email '{}' already exists", payload.email)
        })
    })?;

    tracing::info!(user_id = user.id, role = ?user.role, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Updates user information. Absent fields are left unchanged.
/// Admin only.
pub async fn update_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let current = fetch_user(&pool, id).await?;

    let role = payload.role.unwrap_or(current.role);
    let company_id = payload.company_id.or(current.company_id);
    if role.requires_company() && company_id.is_none() {
        return Err(AppError::BadRequest(format!(
            "company_id is required for role {:?}",
            role
        )));
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");
    separated.push("updated_at = NOW()");

    if let Some(email) = &payload.email {
        separated.push("email = ");
        separated.push_bind_unseparated(email);
    }

    if let Some(password) = &payload.password {
        separated.push("password = ");
        separated.push_bind_unseparated(hash_password(password)?);
    }

    if let Some(full_name) = &payload.full_name {
        separated.push("full_name = ");
        separated.push_bind_unseparated(full_name);
    }

    if let Some(role) = payload.role {
        separated.push("role = ");
        separated.push_bind_unseparated(role);
    }

    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    if let Some(company_id) = payload.company_id {
        separated.push("company_id = ");
        separated.push_bind_unseparated(company_id);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");

    let user = builder
        .build_query_as::<User>()
        .fetch_one(&pool)
        .await
        .map_err(|e| map_write_error(e, || "A user with this email already exists".to_string()))?;

    // Area links only make sense inside the user's company.
    if user.company_id != current.company_id {
        sqlx::query(
            r#"
            DELETE FROM user_area_links l
            USING areas a
            WHERE l.area_id = a.id AND l.user_id = $1
              AND a.company_id IS DISTINCT FROM $2
            "#,
        )
        .bind(id)
        .bind(user.company_id)
        .execute(&pool)
        .await?;
    }

    Ok(Json(user))
}

/// Deletes a user by ID.
/// Admin only. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    remove_user(&pool, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn remove_user(pool: &PgPool, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            let still_referenced = matches!(
                &e,
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation()
            );
            if still_referenced {
                AppError::BadRequest("User still has audit records and cannot be deleted".to_string())
            } else {
                AppError::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = id, "User deleted");

    Ok(())
}

/// Links a user to an area of their own company.
/// Admin only. Linking twice is a no-op.
pub async fn assign_area(
    State(pool): State<PgPool>,
    Path((user_id, area_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let user = fetch_user(&pool, user_id).await?;

    let area = fetch_area(&pool, area_id).await?;

    if user.company_id != Some(area.company_id) {
        return Err(AppError::BadRequest(
            "User and area belong to different companies".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO user_area_links (user_id, area_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, area_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(area_id)
    .execute(&pool)
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Admin only.
pub async fn unassign_area(
    State(pool): State<PgPool>,
    Path((user_id, area_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM user_area_links WHERE user_id = $1 AND area_id = $2")
        .bind(user_id)
        .bind(area_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "User is not assigned to this area".to_string(),
        ));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(current: &str, new: &str) -> ChangePasswordRequest {
        ChangePasswordRequest {
            current_password: current.to_string(),
            new_password: new.to_string(),
        }
    }

    #[test]
    fn password_change_checks_current_and_reuse() {
        let stored = hash_password("old-password").unwrap();

        let wrong = check_password_change(&stored, &change("guess-again", "new-password"));
        assert!(matches!(wrong, Err(AppError::BadRequest(msg)) if msg == "Incorrect password"));

        let reused = check_password_change(&stored, &change("old-password", "old-password"));
        assert!(matches!(
            reused,
            Err(AppError::BadRequest(msg)) if msg == "New password cannot be the same as the current one"
        ));

        assert!(check_password_change(&stored, &change("old-password", "new-password")).is_ok());
    }
}
