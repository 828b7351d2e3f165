use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Role, User, UserStatus};
use crate::state::AppState;

use super::bookings::BookingsQuery;
use super::Data;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub created_at: String,
}

fn user_response(u: User) -> UserResponse {
    UserResponse {
        id: u.id,
        name: u.name,
        email: u.email,
        role: u.role.as_str().to_string(),
        status: u.status.as_str().to_string(),
        created_at: u.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

fn require_admin(
    db: &rusqlite::Connection,
    headers: &HeaderMap,
) -> Result<crate::auth::AuthUser, AppError> {
    let user = auth::require_session(db, headers)?;
    auth::require_role(&user, Role::Admin)?;
    Ok(user)
}

// GET /api/admin/users
#[derive(Deserialize)]
pub struct UsersQuery {
    pub role: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Data<Vec<UserResponse>>>, AppError> {
    let db = state.db.lock().unwrap();
    require_admin(&db, &headers)?;

    let role_filter = match query.role.as_deref() {
        None => None,
        Some(s) => Some(
            Role::parse(s).ok_or_else(|| AppError::Validation(format!("invalid role: {s}")))?,
        ),
    };
    let users = queries::list_users(&db, role_filter, query.limit.unwrap_or(50))?;

    Ok(Json(Data {
        data: users.into_iter().map(user_response).collect(),
    }))
}

// PATCH /api/admin/users/:id
#[derive(Deserialize)]
pub struct UpdateUserBody {
    pub role: Option<String>,
    pub status: Option<String>,
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserBody>,
) -> Result<Json<Data<UserResponse>>, AppError> {
    let db = state.db.lock().unwrap();
    require_admin(&db, &headers)?;

    if body.role.is_none() && body.status.is_none() {
        return Err(AppError::Validation("role or status is required".to_string()));
    }

    let role = match body.role.as_deref() {
        None => None,
        Some(s) => Some(
            Role::parse(s).ok_or_else(|| AppError::Validation(format!("invalid role: {s}")))?,
        ),
    };
    let status = match body.status.as_deref() {
        None => None,
        Some(s) => Some(
            UserStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("invalid status: {s}")))?,
        ),
    };

    if !queries::update_user_moderation(&db, &id, role, status)? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    tracing::info!(user_id = %id, "user moderated");

    let user = queries::get_user(&db, &id)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(Data {
        data: user_response(user),
    }))
}

// PATCH /api/admin/tutors/:id/verify
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTutorBody {
    pub is_verified: bool,
}

pub async fn verify_tutor(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<VerifyTutorBody>,
) -> Result<Json<Data<serde_json::Value>>, AppError> {
    let db = state.db.lock().unwrap();
    require_admin(&db, &headers)?;

    if !queries::set_tutor_verified(&db, &id, body.is_verified)? {
        return Err(AppError::NotFound("Tutor profile not found".to_string()));
    }
    tracing::info!(profile_id = %id, verified = body.is_verified, "tutor verification updated");

    Ok(Json(Data {
        data: serde_json::json!({ "id": id, "isVerified": body.is_verified }),
    }))
}

// GET /api/admin/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Data<serde_json::Value>>, AppError> {
    let db = state.db.lock().unwrap();
    require_admin(&db, &headers)?;

    let status_filter = match query.status.as_deref() {
        None => None,
        Some(s) => Some(
            crate::models::BookingStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("invalid status: {s}")))?,
        ),
    };
    let bookings = queries::list_all_bookings(&db, status_filter, query.limit.unwrap_or(50))?;

    let data = bookings
        .into_iter()
        .map(|b| {
            serde_json::json!({
                "id": b.id,
                "studentId": b.student_id,
                "tutorId": b.tutor_id,
                "date": b.date.format("%Y-%m-%d").to_string(),
                "startTime": b.start_time,
                "endTime": b.end_time,
                "status": b.status.as_str(),
                "totalAmount": b.total_amount,
            })
        })
        .collect();

    Ok(Json(Data {
        data: serde_json::Value::Array(data),
    }))
}

// GET /api/admin/stats
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatsResponse {
    pub total_users: i64,
    pub total_tutors: i64,
    pub total_bookings: i64,
    pub total_reviews: i64,
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Data<AdminStatsResponse>>, AppError> {
    let db = state.db.lock().unwrap();
    require_admin(&db, &headers)?;

    let stats = queries::get_admin_stats(&db)?;
    Ok(Json(Data {
        data: AdminStatsResponse {
            total_users: stats.total_users,
            total_tutors: stats.total_tutors,
            total_bookings: stats.total_bookings,
            total_reviews: stats.total_reviews,
        },
    }))
}
