use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries::{self, TutorFilters};
use crate::errors::AppError;
use crate::models::{Role, TutorProfile};
use crate::state::AppState;

use super::Data;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorResponse {
    /// The bookable tutor profile id, as accepted by POST /api/bookings.
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub hourly_rate: i64,
    pub rating: f64,
    pub total_reviews: i64,
    pub is_verified: bool,
}

fn tutor_response(profile: TutorProfile, name: String, email: String) -> TutorResponse {
    TutorResponse {
        id: profile.id,
        user_id: profile.user_id,
        name,
        email,
        bio: profile.bio,
        hourly_rate: profile.hourly_rate,
        rating: profile.rating,
        total_reviews: profile.total_reviews,
        is_verified: profile.is_verified,
    }
}

// GET /api/tutors
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorsQuery {
    pub search: Option<String>,
    pub min_rating: Option<f64>,
    pub max_rate: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_tutors(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TutorsQuery>,
) -> Result<Json<Data<Vec<TutorResponse>>>, AppError> {
    let db = state.db.lock().unwrap();

    let filters = TutorFilters {
        search: query.search,
        min_rating: query.min_rating,
        max_rate: query.max_rate,
        limit: query.limit.unwrap_or(50),
    };
    let tutors = queries::list_tutors(&db, &filters)?;

    Ok(Json(Data {
        data: tutors
            .into_iter()
            .map(|t| tutor_response(t.profile, t.name, t.email))
            .collect(),
    }))
}

// GET /api/tutors/:id  (id = the tutor's user id; verified profiles only)
pub async fn get_tutor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Data<TutorResponse>>, AppError> {
    let db = state.db.lock().unwrap();

    let user = queries::get_user(&db, &id)?
        .filter(|u| u.role == Role::Tutor)
        .ok_or_else(|| AppError::NotFound("Tutor not found".to_string()))?;
    let profile = queries::get_tutor_profile_by_user(&db, &user.id)?
        .filter(|p| p.is_verified)
        .ok_or_else(|| AppError::NotFound("Tutor not found".to_string()))?;

    Ok(Json(Data {
        data: tutor_response(profile, user.name, user.email),
    }))
}
