// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Role of an account. Mapped to the Postgres enum `user_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Auditor,
    User,
}

impl UserRole {
    /// Auditors and plain users always belong to a company.
    pub fn requires_company(self) -> bool {
        !matches!(self, UserRole::Admin)
    }
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique login email.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub full_name: Option<String>,

    pub role: UserRole,

    /// Inactive accounts cannot log in or call the API.
    pub is_active: bool,

    pub company_id: Option<i64>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Profile of the current user, including area assignments.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub area_ids: Vec<i64>,
}

/// DTO for self-registration into an existing company.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
    pub company_id: i64,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 255))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for Admin creating a user (can specify role).
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
    pub role: UserRole,
    pub company_id: Option<i64>,
}

/// DTO for updating a user. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct AdminUpdateUserRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub company_id: Option<i64>,
}

/// DTO for a user editing their own profile. Role, company and activation
/// stay admin-only.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(email(message = "A valid email address is required."))]
    pub email: Option<String>,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 128))]
    pub current_password: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_admins_may_exist_without_a_company() {
        assert!(!UserRole::Admin.requires_company());
        assert!(UserRole::Auditor.requires_company());
        assert!(UserRole::User.requires_company());
    }

    #[test]
    fn register_rejects_bad_email_and_short_password() {
        let req: RegisterRequest = serde_json::from_value(json!({
            "email": "not-an-email",
            "password": "short",
            "company_id": 1
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let now = chrono::Utc::now();
        let user = User {
            id: 7,
            email: "a@b.test".to_string(),
            password: "$argon2id$secret".to_string(),
            full_name: None,
            role: UserRole::Auditor,
            is_active: true,
            company_id: Some(1),
            created_at: now,
            updated_at: now,
        };
        let encoded = serde_json::to_value(&user).unwrap();
        assert!(encoded.get("password").is_none());
        assert_eq!(encoded["role"], "AUDITOR");
    }

    #[test]
    fn password_change_needs_a_long_enough_new_password() {
        let req: ChangePasswordRequest = serde_json::from_value(json!({
            "current_password": "old-password",
            "new_password": "short"
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("new_password"));

        let profile: UpdateMeRequest =
            serde_json::from_value(json!({"email": "nope"})).unwrap();
        assert!(profile.validate().is_err());
    }
}
