// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, map_write_error},
    models::user::{LoginRequest, RegisterRequest, User, UserRole},
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new USER account inside an existing company.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let company_exists = sqlx::query_scalar::<_, i64>("SELECT id FROM companies WHERE id = $1")
        .bind(payload.company_id)
        .fetch_optional(&pool)
        .await?
        .is_some();
    if !company_exists {
        return Err(AppError::NotFound("Company not found".to_string()));
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
    .bind(UserRole::User)
    .bind(payload.company_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        map_write_error(e, || {
            format!("A user with email '{}' already exists", payload.email)
        })
    })?;

    tracing::info!(user_id = user.id, company_id = payload.company_id, "User registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user by email and returns a JWT token.
///
/// Unknown email and wrong password give the same answer.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Login DB error: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::AuthError("Incorrect email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Incorrect email or password".to_string()));
    }

    if !user.is_active {
        return Err(AppError::BadRequest("Inactive user".to_string()));
    }

    let token = sign_jwt(
        user.id,
        user.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
    })))
}
