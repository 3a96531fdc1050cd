// src/utils/access.rs

use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        assignment::AuditAssignment,
        audit_response::{AuditResponse, ResponseStatus},
        user::{User, UserRole},
    },
    utils::jwt::Claims,
};

/// The authenticated caller, with the areas they are assigned to.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user: User,
    pub area_ids: Vec<i64>,
}

impl Viewer {
    /// Loads the caller named by the token. Deleted or deactivated accounts
    /// are refused even while their token is still valid.
    pub async fn load(pool: &PgPool, claims: &Claims) -> Result<Self, AppError> {
        let user_id = claims.user_id()?;

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password, full_name, role, is_active, company_id, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::AuthError("User not found".to_string()))?;

        if !user.is_active {
            return Err(AppError::BadRequest("Inactive user".to_string()));
        }

        let area_ids = sqlx::query_scalar::<_, i64>(
            "SELECT area_id FROM user_area_links WHERE user_id = $1 ORDER BY area_id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(Self { user, area_ids })
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == UserRole::Admin
    }

    pub fn can_access_company(&self, company_id: i64) -> bool {
        self.is_admin() || self.user.company_id == Some(company_id)
    }

    pub fn require_company(&self, company_id: i64) -> Result<(), AppError> {
        if self.can_access_company(company_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Not enough permissions to access this company".to_string(),
            ))
        }
    }

    /// Same company, and the assignment is public, company-wide, or in one
    /// of the caller's areas.
    pub fn can_access_assignment(&self, assignment: &AuditAssignment) -> bool {
        if self.is_admin() {
            return true;
        }
        if self.user.company_id != Some(assignment.company_id) {
            return false;
        }
        match assignment.area_id {
            _ if assignment.is_public => true,
            None => true,
            Some(area_id) => self.area_ids.contains(&area_id),
        }
    }

    pub fn require_assignment(&self, assignment: &AuditAssignment) -> Result<(), AppError> {
        if self.can_access_assignment(assignment) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Not enough permissions to access this audit assignment".to_string(),
            ))
        }
    }

    /// Only auditors answer audits.
    pub fn can_respond(&self, assignment: &AuditAssignment) -> bool {
        self.user.role == UserRole::Auditor && self.can_access_assignment(assignment)
    }

    /// Authors edit their own drafts; admins edit anything.
    pub fn can_edit_response(&self, response: &AuditResponse) -> bool {
        self.is_admin()
            || (response.auditor_id == self.user.id && response.status == ResponseStatus::Draft)
    }
}
