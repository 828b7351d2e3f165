use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Role, UserStatus};

/// Identity resolved from a session token: who is calling and as what.
/// Session issuance (signup, login, password handling) lives in the
/// external auth service; this API only reads the sessions table.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

pub fn require_session(conn: &Connection, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let user = queries::get_user_by_session(conn, token)?.ok_or(AppError::Unauthorized)?;
    if user.status == UserStatus::Suspended {
        return Err(AppError::Forbidden("Account suspended".to_string()));
    }

    Ok(AuthUser {
        id: user.id,
        role: user.role,
    })
}

pub fn require_role(user: &AuthUser, role: Role) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden(format!(
            "{} role required",
            role.as_str()
        )));
    }
    Ok(())
}
