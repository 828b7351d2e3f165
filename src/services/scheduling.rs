use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, Role};

/// Parses "H:MM" / "HH:MM" into minutes since midnight. All interval
/// ordering happens on the numeric form, so nothing downstream depends on
/// zero-padded string comparison.
pub fn parse_time(s: &str) -> Result<u16, AppError> {
    let err = || AppError::Validation(format!("invalid time: {s} (expected HH:MM)"));

    let (hour_part, minute_part) = s.split_once(':').ok_or_else(err)?;
    if hour_part.is_empty() || hour_part.len() > 2 || minute_part.len() != 2 {
        return Err(err());
    }

    let hour: u16 = hour_part.parse().map_err(|_| err())?;
    let minute: u16 = minute_part.parse().map_err(|_| err())?;
    if hour > 23 || minute > 59 {
        return Err(err());
    }

    Ok(hour * 60 + minute)
}

/// Zero-padded "HH:MM" for storage and responses.
pub fn format_time(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Calendar date parsed from its year/month/day components, with no
/// timezone shift applied.
pub fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {s} (expected YYYY-MM-DD)")))
}

/// Half-open interval intersection: [a_start, a_end) and [b_start, b_end)
/// overlap iff each starts before the other ends. Touching endpoints do
/// not overlap.
fn overlaps(a_start: u16, a_end: u16, b_start: u16, b_end: u16) -> bool {
    a_start < b_end && b_start < a_end
}

/// Errors with Conflict if any CONFIRMED/COMPLETED booking for the tutor
/// on this date intersects the requested slot. PENDING and CANCELLED
/// bookings never block. `exclude_id` drops the booking's own row when
/// rescheduling.
fn ensure_slot_free(
    conn: &Connection,
    tutor_id: &str,
    date: &NaiveDate,
    start_min: u16,
    end_min: u16,
    exclude_id: Option<&str>,
) -> Result<(), AppError> {
    let existing = queries::get_blocking_bookings(conn, tutor_id, date, exclude_id)?;

    for booking in &existing {
        let booked_start = parse_time(&booking.start_time)?;
        let booked_end = parse_time(&booking.end_time)?;
        if overlaps(booked_start, booked_end, start_min, end_min) {
            return Err(AppError::Conflict("Time slot already booked".to_string()));
        }
    }

    Ok(())
}

pub struct BookingRequest {
    pub tutor_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub notes: Option<String>,
}

/// Creates a CONFIRMED booking for a student against a tutor profile.
/// The conflict check and the insert run inside one IMMEDIATE transaction
/// so two concurrent requests for an overlapping slot cannot both commit.
pub fn create_booking(
    conn: &mut Connection,
    student_id: &str,
    req: &BookingRequest,
) -> Result<Booking, AppError> {
    let date = parse_date(&req.date)?;
    let start_min = parse_time(&req.start_time)?;
    let end_min = parse_time(&req.end_time)?;
    if end_min <= start_min {
        return Err(AppError::Validation(
            "endTime must be after startTime".to_string(),
        ));
    }

    let profile = queries::get_tutor_profile(conn, &req.tutor_id)?
        .ok_or_else(|| AppError::NotFound("Tutor not found".to_string()))?;
    let owner = queries::get_user(conn, &profile.user_id)?
        .ok_or_else(|| AppError::NotFound("Tutor not found".to_string()))?;
    if owner.role != Role::Tutor {
        return Err(AppError::NotFound("Tutor not found".to_string()));
    }

    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        tutor_id: profile.id.clone(),
        date,
        start_time: format_time(start_min),
        end_time: format_time(end_min),
        status: BookingStatus::Confirmed,
        // Snapshot of the tutor's current rate; later rate changes do not
        // reprice existing bookings.
        total_amount: profile.hourly_rate,
        notes: req.notes.clone(),
        created_at: now,
        updated_at: now,
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_slot_free(&tx, &booking.tutor_id, &date, start_min, end_min, None)?;
    queries::create_booking(&tx, &booking)?;
    tx.commit()?;

    Ok(booking)
}

#[derive(Debug, Default)]
pub struct BookingUpdate {
    pub status: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Status update or reschedule. The requester must be the booking's
/// student or the tutor profile's owning user; time changes are further
/// restricted to the booking's own student while the booking is
/// CONFIRMED, and re-run the conflict check against everything except the
/// booking's own row.
pub fn update_booking(
    conn: &mut Connection,
    requester_id: &str,
    requester_role: Role,
    booking_id: &str,
    update: &BookingUpdate,
) -> Result<Booking, AppError> {
    let booking = queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    match requester_role {
        Role::Admin => {}
        Role::Student => {
            if booking.student_id != requester_id {
                return Err(AppError::Forbidden("Forbidden".to_string()));
            }
        }
        Role::Tutor => {
            let profile = queries::get_tutor_profile_by_user(conn, requester_id)?;
            if profile.map(|p| p.id) != Some(booking.tutor_id.clone()) {
                return Err(AppError::Forbidden("Forbidden".to_string()));
            }
        }
    }

    let new_status = match &update.status {
        Some(s) => Some(
            BookingStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("invalid status: {s}")))?,
        ),
        None => None,
    };

    let wants_reschedule =
        update.date.is_some() || update.start_time.is_some() || update.end_time.is_some();

    if wants_reschedule {
        if requester_role != Role::Student || booking.student_id != requester_id {
            return Err(AppError::Forbidden(
                "Only students can reschedule their own bookings".to_string(),
            ));
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::Validation(
                "Only confirmed bookings can be rescheduled".to_string(),
            ));
        }

        // Unsupplied fields keep the booking's current values.
        let new_date = match &update.date {
            Some(d) => parse_date(d)?,
            None => booking.date,
        };
        let start_min = parse_time(update.start_time.as_deref().unwrap_or(&booking.start_time))?;
        let end_min = parse_time(update.end_time.as_deref().unwrap_or(&booking.end_time))?;
        if end_min <= start_min {
            return Err(AppError::Validation(
                "endTime must be after startTime".to_string(),
            ));
        }

        let status = match new_status {
            Some(s) if s != booking.status => {
                if !booking.status.can_transition_to(s) {
                    return Err(AppError::Validation(format!(
                        "cannot change booking from {} to {}",
                        booking.status.as_str(),
                        s.as_str()
                    )));
                }
                s
            }
            _ => booking.status,
        };

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_slot_free(
            &tx,
            &booking.tutor_id,
            &new_date,
            start_min,
            end_min,
            Some(&booking.id),
        )?;
        queries::update_booking_slot(
            &tx,
            &booking.id,
            &new_date,
            &format_time(start_min),
            &format_time(end_min),
            status,
        )?;
        tx.commit()?;
    } else {
        let status = new_status
            .ok_or_else(|| AppError::Validation("status is required".to_string()))?;
        if status != booking.status {
            if !booking.status.can_transition_to(status) {
                return Err(AppError::Validation(format!(
                    "cannot change booking from {} to {}",
                    booking.status.as_str(),
                    status.as_str()
                )));
            }
            queries::update_booking_status(conn, &booking.id, status)?;
        }
    }

    queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{User, UserStatus};

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn seed_user(conn: &Connection, id: &str, role: Role) {
        let now = Utc::now().naive_utc();
        queries::create_user(
            conn,
            &User {
                id: id.to_string(),
                name: format!("User {id}"),
                email: format!("{id}@example.com"),
                role,
                status: UserStatus::Active,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
    }

    fn seed_tutor(conn: &Connection, user_id: &str, profile_id: &str, rate: i64) {
        seed_user(conn, user_id, Role::Tutor);
        let now = Utc::now().naive_utc();
        queries::create_tutor_profile(
            conn,
            &crate::models::TutorProfile {
                id: profile_id.to_string(),
                user_id: user_id.to_string(),
                bio: None,
                hourly_rate: rate,
                rating: 0.0,
                total_reviews: 0,
                is_verified: true,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
    }

    fn request(tutor_id: &str, date: &str, start: &str, end: &str) -> BookingRequest {
        BookingRequest {
            tutor_id: tutor_id.to_string(),
            date: date.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            notes: None,
        }
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("00:00").unwrap(), 0);
        assert_eq!(parse_time("9:30").unwrap(), 570);
        assert_eq!(parse_time("09:30").unwrap(), 570);
        assert_eq!(parse_time("23:59").unwrap(), 1439);

        assert!(parse_time("24:00").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("9:5").is_err());
        assert!(parse_time("0930").is_err());
        assert!(parse_time("").is_err());
        assert!(parse_time("aa:bb").is_err());
    }

    #[test]
    fn test_format_time_zero_pads() {
        assert_eq!(format_time(570), "09:30");
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(1439), "23:59");
    }

    #[test]
    fn test_overlap_cases() {
        // Partial overlap.
        assert!(overlaps(600, 660, 630, 690));
        assert!(overlaps(630, 690, 600, 660));
        // One interval containing the other.
        assert!(overlaps(540, 720, 600, 660));
        assert!(overlaps(600, 660, 540, 720));
        // Touching endpoints are free.
        assert!(!overlaps(600, 660, 660, 720));
        assert!(!overlaps(660, 720, 600, 660));
        // Disjoint.
        assert!(!overlaps(540, 600, 660, 720));
    }

    #[test]
    fn test_create_booking_snapshots_rate() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);

        let booking =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "11:00"))
                .unwrap();
        assert_eq!(booking.total_amount, 5000);
        assert_eq!(booking.status, BookingStatus::Confirmed);

        // A later rate change never touches the stored amount.
        queries::update_tutor_profile(&conn, "tp-1", None, Some(9000)).unwrap();
        let reloaded = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(reloaded.total_amount, 5000);
    }

    #[test]
    fn test_create_booking_conflict() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_user(&conn, "student-2", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);

        create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:30", "11:30"))
            .unwrap();

        let result =
            create_booking(&mut conn, "student-2", &request("tp-1", "2025-07-01", "10:00", "11:00"));
        assert!(matches!(result, Err(AppError::Conflict(_))));

        // Touching slot is fine.
        let result =
            create_booking(&mut conn, "student-2", &request("tp-1", "2025-07-01", "11:30", "12:30"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_create_booking_other_date_and_tutor_do_not_conflict() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);
        seed_tutor(&conn, "tutor-user-2", "tp-2", 4000);

        create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "11:00"))
            .unwrap();

        assert!(create_booking(
            &mut conn,
            "student-1",
            &request("tp-1", "2025-07-02", "10:00", "11:00")
        )
        .is_ok());
        assert!(create_booking(
            &mut conn,
            "student-1",
            &request("tp-2", "2025-07-01", "10:00", "11:00")
        )
        .is_ok());
    }

    #[test]
    fn test_cancelled_booking_frees_slot() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);

        let booking =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "11:00"))
                .unwrap();
        queries::update_booking_status(&conn, &booking.id, BookingStatus::Cancelled).unwrap();

        assert!(create_booking(
            &mut conn,
            "student-1",
            &request("tp-1", "2025-07-01", "10:00", "11:00")
        )
        .is_ok());
    }

    #[test]
    fn test_create_booking_rejects_inverted_interval() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);

        let result =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "11:00", "10:00"));
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "10:00"));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_create_booking_unknown_tutor() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);

        let result =
            create_booking(&mut conn, "student-1", &request("missing", "2025-07-01", "10:00", "11:00"));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_reschedule_only_by_own_student() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);

        let booking =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "11:00"))
                .unwrap();

        // The profile-owning tutor may patch status, but never the slot.
        let update = BookingUpdate {
            start_time: Some("12:00".to_string()),
            end_time: Some("13:00".to_string()),
            ..Default::default()
        };
        let result = update_booking(&mut conn, "tutor-user-1", Role::Tutor, &booking.id, &update);
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let result = update_booking(&mut conn, "student-1", Role::Student, &booking.id, &update);
        assert!(result.is_ok());
        let moved = result.unwrap();
        assert_eq!(moved.start_time, "12:00");
        assert_eq!(moved.end_time, "13:00");
    }

    #[test]
    fn test_reschedule_requires_confirmed_status() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);

        let booking =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "11:00"))
                .unwrap();
        queries::update_booking_status(&conn, &booking.id, BookingStatus::Completed).unwrap();

        let update = BookingUpdate {
            start_time: Some("14:00".to_string()),
            end_time: Some("15:00".to_string()),
            ..Default::default()
        };
        let result = update_booking(&mut conn, "student-1", Role::Student, &booking.id, &update);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_reschedule_conflict_excludes_own_row() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);

        let booking =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "11:00"))
                .unwrap();
        create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "12:00", "13:00"))
            .unwrap();

        // Moving onto the other booking conflicts.
        let update = BookingUpdate {
            start_time: Some("12:30".to_string()),
            end_time: Some("13:30".to_string()),
            ..Default::default()
        };
        let result = update_booking(&mut conn, "student-1", Role::Student, &booking.id, &update);
        assert!(matches!(result, Err(AppError::Conflict(_))));

        // Shifting within its own old slot is fine: the booking's own row
        // is excluded from the check.
        let update = BookingUpdate {
            start_time: Some("10:30".to_string()),
            end_time: Some("11:30".to_string()),
            ..Default::default()
        };
        assert!(update_booking(&mut conn, "student-1", Role::Student, &booking.id, &update).is_ok());
    }

    #[test]
    fn test_failed_reschedule_leaves_booking_untouched() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);

        let booking =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "11:00"))
                .unwrap();
        create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "12:00", "13:00"))
            .unwrap();

        let update = BookingUpdate {
            date: Some("2025-07-01".to_string()),
            start_time: Some("12:00".to_string()),
            end_time: Some("13:00".to_string()),
            ..Default::default()
        };
        let _ = update_booking(&mut conn, "student-1", Role::Student, &booking.id, &update);

        let reloaded = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(reloaded.start_time, "10:00");
        assert_eq!(reloaded.end_time, "11:00");
    }

    #[test]
    fn test_status_transitions_enforced() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);

        let booking =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "11:00"))
                .unwrap();

        let complete = BookingUpdate {
            status: Some("COMPLETED".to_string()),
            ..Default::default()
        };
        let updated =
            update_booking(&mut conn, "tutor-user-1", Role::Tutor, &booking.id, &complete).unwrap();
        assert_eq!(updated.status, BookingStatus::Completed);

        // COMPLETED is terminal.
        let cancel = BookingUpdate {
            status: Some("CANCELLED".to_string()),
            ..Default::default()
        };
        let result = update_booking(&mut conn, "student-1", Role::Student, &booking.id, &cancel);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_update_requires_party() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_user(&conn, "student-2", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1", 5000);
        seed_tutor(&conn, "tutor-user-2", "tp-2", 4000);

        let booking =
            create_booking(&mut conn, "student-1", &request("tp-1", "2025-07-01", "10:00", "11:00"))
                .unwrap();

        let cancel = BookingUpdate {
            status: Some("CANCELLED".to_string()),
            ..Default::default()
        };
        let result = update_booking(&mut conn, "student-2", Role::Student, &booking.id, &cancel);
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        let result = update_booking(&mut conn, "tutor-user-2", Role::Tutor, &booking.id, &cancel);
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        assert!(update_booking(&mut conn, "student-1", Role::Student, &booking.id, &cancel).is_ok());
    }
}
