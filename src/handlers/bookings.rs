use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, Role};
use crate::services::scheduling::{self, BookingRequest, BookingUpdate};
use crate::state::AppState;

use super::Data;

#[derive(Serialize)]
pub struct PartyInfo {
    pub name: String,
    pub email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: String,
    pub student_id: String,
    pub tutor_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub total_amount: i64,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<PartyInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tutor: Option<PartyInfo>,
}

fn booking_response(b: Booking, parties: Option<queries::BookingParties>) -> BookingResponse {
    let (student, tutor) = match parties {
        Some(p) => (
            Some(PartyInfo {
                name: p.student_name,
                email: p.student_email,
            }),
            Some(PartyInfo {
                name: p.tutor_name,
                email: p.tutor_email,
            }),
        ),
        None => (None, None),
    };

    BookingResponse {
        id: b.id,
        student_id: b.student_id,
        tutor_id: b.tutor_id,
        date: b.date.format("%Y-%m-%d").to_string(),
        start_time: b.start_time,
        end_time: b.end_time,
        status: b.status.as_str().to_string(),
        total_amount: b.total_amount,
        notes: b.notes,
        created_at: b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        updated_at: b.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        student,
        tutor,
    }
}

fn parse_status_filter(s: Option<&str>) -> Result<Option<BookingStatus>, AppError> {
    match s {
        None => Ok(None),
        Some(s) => BookingStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("invalid status: {s}"))),
    }
}

// POST /api/bookings
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingBody {
    pub tutor_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub notes: Option<String>,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingBody>,
) -> Result<(StatusCode, Json<Data<BookingResponse>>), AppError> {
    let mut db = state.db.lock().unwrap();
    let user = auth::require_session(&db, &headers)?;
    auth::require_role(&user, Role::Student)?;

    let req = BookingRequest {
        tutor_id: body.tutor_id,
        date: body.date,
        start_time: body.start_time,
        end_time: body.end_time,
        notes: body.notes,
    };
    let booking = scheduling::create_booking(&mut db, &user.id, &req)?;
    tracing::info!(booking_id = %booking.id, tutor_id = %booking.tutor_id, "booking created");

    let parties = queries::get_booking_parties(&db, &booking)?;
    Ok((
        StatusCode::CREATED,
        Json(Data {
            data: booking_response(booking, Some(parties)),
        }),
    ))
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// Students see their own bookings, tutors their profile's, admins all.
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Data<Vec<BookingResponse>>>, AppError> {
    let db = state.db.lock().unwrap();
    let user = auth::require_session(&db, &headers)?;

    let status_filter = parse_status_filter(query.status.as_deref())?;
    let limit = query.limit.unwrap_or(50);

    let bookings = match user.role {
        Role::Student => queries::list_student_bookings(&db, &user.id, status_filter, limit)?,
        Role::Tutor => match queries::get_tutor_profile_by_user(&db, &user.id)? {
            Some(profile) => queries::list_tutor_bookings(&db, &profile.id, status_filter, limit)?,
            None => vec![],
        },
        Role::Admin => queries::list_all_bookings(&db, status_filter, limit)?,
    };

    Ok(Json(Data {
        data: bookings
            .into_iter()
            .map(|b| booking_response(b, None))
            .collect(),
    }))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Data<BookingResponse>>, AppError> {
    let db = state.db.lock().unwrap();
    let user = auth::require_session(&db, &headers)?;

    let booking = queries::get_booking(&db, &id)?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    // Masked as NotFound for anyone who is not a party to the booking.
    let is_party = match user.role {
        Role::Admin => true,
        Role::Student => booking.student_id == user.id,
        Role::Tutor => queries::get_tutor_profile_by_user(&db, &user.id)?
            .map(|p| p.id == booking.tutor_id)
            .unwrap_or(false),
    };
    if !is_party {
        return Err(AppError::NotFound("Booking not found".to_string()));
    }

    let parties = queries::get_booking_parties(&db, &booking)?;
    Ok(Json(Data {
        data: booking_response(booking, Some(parties)),
    }))
}

// PATCH /api/bookings/:id
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingBody {
    pub status: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateBookingBody>,
) -> Result<Json<Data<BookingResponse>>, AppError> {
    let mut db = state.db.lock().unwrap();
    let user = auth::require_session(&db, &headers)?;

    let update = BookingUpdate {
        status: body.status,
        date: body.date,
        start_time: body.start_time,
        end_time: body.end_time,
    };
    let booking = scheduling::update_booking(&mut db, &user.id, user.role, &id, &update)?;
    tracing::info!(booking_id = %booking.id, status = booking.status.as_str(), "booking updated");

    let parties = queries::get_booking_parties(&db, &booking)?;
    Ok(Json(Data {
        data: booking_response(booking, Some(parties)),
    }))
}
