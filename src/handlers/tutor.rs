use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Role, TutorProfile};
use crate::state::AppState;

use super::Data;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorProfileResponse {
    pub id: String,
    pub user_id: String,
    pub bio: Option<String>,
    pub hourly_rate: i64,
    pub rating: f64,
    pub total_reviews: i64,
    pub is_verified: bool,
}

fn profile_response(p: TutorProfile) -> TutorProfileResponse {
    TutorProfileResponse {
        id: p.id,
        user_id: p.user_id,
        bio: p.bio,
        hourly_rate: p.hourly_rate,
        rating: p.rating,
        total_reviews: p.total_reviews,
        is_verified: p.is_verified,
    }
}

fn own_profile(
    db: &rusqlite::Connection,
    headers: &HeaderMap,
) -> Result<TutorProfile, AppError> {
    let user = auth::require_session(db, headers)?;
    auth::require_role(&user, Role::Tutor)?;
    queries::get_tutor_profile_by_user(db, &user.id)?
        .ok_or_else(|| AppError::NotFound("Tutor profile not found".to_string()))
}

// GET /api/tutor/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Data<TutorProfileResponse>>, AppError> {
    let db = state.db.lock().unwrap();
    let profile = own_profile(&db, &headers)?;
    Ok(Json(Data {
        data: profile_response(profile),
    }))
}

// PUT /api/tutor/profile
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileBody {
    pub bio: Option<String>,
    pub hourly_rate: Option<i64>,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateProfileBody>,
) -> Result<Json<Data<TutorProfileResponse>>, AppError> {
    let db = state.db.lock().unwrap();
    let profile = own_profile(&db, &headers)?;

    if let Some(rate) = body.hourly_rate {
        if rate <= 0 {
            return Err(AppError::Validation(
                "hourlyRate must be positive".to_string(),
            ));
        }
    }

    // Rate changes apply to future bookings only; existing bookings keep
    // their snapshotted total_amount.
    queries::update_tutor_profile(&db, &profile.id, body.bio.as_deref(), body.hourly_rate)?;

    let updated = queries::get_tutor_profile(&db, &profile.id)?
        .ok_or_else(|| AppError::NotFound("Tutor profile not found".to_string()))?;
    Ok(Json(Data {
        data: profile_response(updated),
    }))
}

// GET /api/tutor/stats
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorStatsResponse {
    pub total_bookings: i64,
    pub completed_bookings: i64,
    pub cancelled_bookings: i64,
    pub upcoming_bookings: i64,
    pub total_earnings: i64,
    pub rating: f64,
    pub total_reviews: i64,
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Data<TutorStatsResponse>>, AppError> {
    let db = state.db.lock().unwrap();
    let profile = own_profile(&db, &headers)?;

    let stats = queries::get_tutor_stats(&db, &profile.id)?;
    Ok(Json(Data {
        data: TutorStatsResponse {
            total_bookings: stats.total_bookings,
            completed_bookings: stats.completed_bookings,
            cancelled_bookings: stats.cancelled_bookings,
            upcoming_bookings: stats.upcoming_bookings,
            total_earnings: stats.total_earnings,
            rating: profile.rating,
            total_reviews: profile.total_reviews,
        },
    }))
}
