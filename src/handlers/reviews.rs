use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Review, Role};
use crate::services::rating::{self, ReviewRequest};
use crate::state::AppState;

use super::Data;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: String,
    pub booking_id: String,
    pub student_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
}

fn review_response(r: Review) -> ReviewResponse {
    ReviewResponse {
        id: r.id,
        booking_id: r.booking_id,
        student_id: r.student_id,
        rating: r.rating,
        comment: r.comment,
        created_at: r.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

// POST /api/reviews
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewBody {
    pub booking_id: String,
    pub rating: i64,
    pub comment: Option<String>,
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateReviewBody>,
) -> Result<(StatusCode, Json<Data<ReviewResponse>>), AppError> {
    let mut db = state.db.lock().unwrap();
    let user = auth::require_session(&db, &headers)?;
    auth::require_role(&user, Role::Student)?;

    let req = ReviewRequest {
        booking_id: body.booking_id,
        rating: body.rating,
        comment: body.comment,
    };
    let review = rating::submit_review(&mut db, &user.id, &req)?;
    tracing::info!(review_id = %review.id, booking_id = %review.booking_id, "review submitted");

    Ok((
        StatusCode::CREATED,
        Json(Data {
            data: review_response(review),
        }),
    ))
}

// GET /api/reviews/tutor/:tutor_id
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorReviewResponse {
    pub id: String,
    pub user: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub date: String,
    pub created_at: String,
}

pub async fn tutor_reviews(
    State(state): State<Arc<AppState>>,
    Path(tutor_id): Path<String>,
) -> Result<Json<Data<Vec<TutorReviewResponse>>>, AppError> {
    let db = state.db.lock().unwrap();

    let reviews = queries::list_tutor_reviews(&db, &tutor_id)?;
    Ok(Json(Data {
        data: reviews
            .into_iter()
            .map(|r| TutorReviewResponse {
                id: r.review.id,
                user: r.student_name,
                rating: r.review.rating,
                comment: r.review.comment,
                date: r.booking_date,
                created_at: r.review.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            })
            .collect(),
    }))
}
