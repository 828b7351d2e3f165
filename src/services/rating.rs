use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingStatus, Review};

/// One decimal place, half-up.
fn round_rating(avg: f64) -> f64 {
    (avg * 10.0).round() / 10.0
}

pub struct ReviewRequest {
    pub booking_id: String,
    pub rating: i64,
    pub comment: Option<String>,
}

/// Records a student's review of a booking and recomputes the owning
/// tutor profile's aggregate rating. The recompute is a full scan over
/// the tutor's reviews rather than an incremental running average, so a
/// stale aggregate heals on the next successful submission.
pub fn submit_review(
    conn: &mut Connection,
    student_id: &str,
    req: &ReviewRequest,
) -> Result<Review, AppError> {
    if !(1..=5).contains(&req.rating) {
        return Err(AppError::Validation(
            "rating must be between 1 and 5".to_string(),
        ));
    }

    // Ownership mismatch is deliberately reported as NotFound so the
    // response does not leak whether the booking exists.
    let booking = queries::get_booking(conn, &req.booking_id)?
        .filter(|b| b.student_id == student_id)
        .filter(|b| {
            matches!(
                b.status,
                BookingStatus::Confirmed | BookingStatus::Completed
            )
        })
        .ok_or_else(|| {
            AppError::NotFound(
                "Booking not found, or you can only review your own completed sessions"
                    .to_string(),
            )
        })?;

    let review = Review {
        id: Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        student_id: student_id.to_string(),
        rating: req.rating,
        comment: req.comment.clone(),
        created_at: Utc::now().naive_utc(),
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if queries::get_review_by_booking(&tx, &booking.id)?.is_some() {
        return Err(AppError::Conflict(
            "You have already reviewed this session".to_string(),
        ));
    }

    queries::create_review(&tx, &review)?;

    let (total_reviews, avg) = queries::tutor_review_stats(&tx, &booking.tutor_id)?;
    let rating = avg.map(round_rating).unwrap_or(0.0);
    queries::update_tutor_rating(&tx, &booking.tutor_id, rating, total_reviews)?;

    tx.commit()?;

    Ok(review)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Role, TutorProfile, User, UserStatus};
    use crate::services::scheduling::{self, BookingRequest};

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

    fn seed_tutor(conn: &Connection, user_id: &str, profile_id: &str) {
        seed_user(conn, user_id, Role::Tutor);
        let now = Utc::now().naive_utc();
        queries::create_tutor_profile(
            conn,
            &TutorProfile {
                id: profile_id.to_string(),
                user_id: user_id.to_string(),
                bio: None,
                hourly_rate: 5000,
                rating: 0.0,
                total_reviews: 0,
                is_verified: true,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
    }

    /// Confirmed one-hour booking starting at `hour` on 2025-07-01.
    fn seed_booking(conn: &mut Connection, student_id: &str, tutor_id: &str, hour: u16) -> String {
        scheduling::create_booking(
            conn,
            student_id,
            &BookingRequest {
                tutor_id: tutor_id.to_string(),
                date: "2025-07-01".to_string(),
                start_time: format!("{hour:02}:00"),
                end_time: format!("{:02}:00", hour + 1),
                notes: None,
            },
        )
        .unwrap()
        .id
    }

    fn review(booking_id: &str, rating: i64) -> ReviewRequest {
        ReviewRequest {
            booking_id: booking_id.to_string(),
            rating,
            comment: None,
        }
    }

    #[test]
    fn test_round_rating_half_up() {
        assert_eq!(round_rating(4.25), 4.3);
        assert_eq!(round_rating(4.24), 4.2);
        assert_eq!(round_rating(4.0), 4.0);
        assert_eq!(round_rating(4.0 / 3.0), 1.3);
    }

    #[test]
    fn test_rating_out_of_range() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1");
        let booking_id = seed_booking(&mut conn, "student-1", "tp-1", 10);

        for bad in [0, 6, -1] {
            let result = submit_review(&mut conn, "student-1", &review(&booking_id, bad));
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn test_review_recomputes_tutor_rating() {
        let mut conn = setup_db();
        seed_tutor(&conn, "tutor-user-1", "tp-1");
        for (i, rating) in [4, 5, 3].into_iter().enumerate() {
            let student = format!("student-{i}");
            seed_user(&conn, &student, Role::Student);
            let booking_id = seed_booking(&mut conn, &student, "tp-1", 9 + i as u16);
            submit_review(&mut conn, &student, &review(&booking_id, rating)).unwrap();
        }

        let profile = queries::get_tutor_profile(&conn, "tp-1").unwrap().unwrap();
        assert_eq!(profile.total_reviews, 3);
        assert_eq!(profile.rating, 4.0);

        // Fourth review: avg 4.25 rounds half-up to 4.3.
        seed_user(&conn, "student-9", Role::Student);
        let booking_id = seed_booking(&mut conn, "student-9", "tp-1", 15);
        submit_review(&mut conn, "student-9", &review(&booking_id, 5)).unwrap();

        let profile = queries::get_tutor_profile(&conn, "tp-1").unwrap().unwrap();
        assert_eq!(profile.total_reviews, 4);
        assert_eq!(profile.rating, 4.3);
    }

    #[test]
    fn test_one_review_per_booking() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1");
        let booking_id = seed_booking(&mut conn, "student-1", "tp-1", 10);

        submit_review(&mut conn, "student-1", &review(&booking_id, 4)).unwrap();
        let result = submit_review(&mut conn, "student-1", &review(&booking_id, 1));
        assert!(matches!(result, Err(AppError::Conflict(_))));

        // First review and its aggregate are unchanged.
        let first = queries::get_review_by_booking(&conn, &booking_id)
            .unwrap()
            .unwrap();
        assert_eq!(first.rating, 4);
        let profile = queries::get_tutor_profile(&conn, "tp-1").unwrap().unwrap();
        assert_eq!(profile.total_reviews, 1);
        assert_eq!(profile.rating, 4.0);
    }

    #[test]
    fn test_cannot_review_someone_elses_booking() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_user(&conn, "student-2", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1");
        let booking_id = seed_booking(&mut conn, "student-1", "tp-1", 10);

        let result = submit_review(&mut conn, "student-2", &review(&booking_id, 5));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_cannot_review_cancelled_or_missing_booking() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1");
        let booking_id = seed_booking(&mut conn, "student-1", "tp-1", 10);
        queries::update_booking_status(&conn, &booking_id, BookingStatus::Cancelled).unwrap();

        let result = submit_review(&mut conn, "student-1", &review(&booking_id, 5));
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = submit_review(&mut conn, "student-1", &review("missing", 5));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_completed_booking_is_reviewable() {
        let mut conn = setup_db();
        seed_user(&conn, "student-1", Role::Student);
        seed_tutor(&conn, "tutor-user-1", "tp-1");
        let booking_id = seed_booking(&mut conn, "student-1", "tp-1", 10);
        queries::update_booking_status(&conn, &booking_id, BookingStatus::Completed).unwrap();

        assert!(submit_review(&mut conn, "student-1", &review(&booking_id, 5)).is_ok());
    }
}
