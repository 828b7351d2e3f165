use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{Booking, BookingStatus, Review, Role, TutorProfile, User, UserStatus};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FMT: &str = "%Y-%m-%d";

fn now_str() -> String {
    Utc::now().naive_utc().format(TS_FMT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS_FMT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Users & Sessions ──

pub fn create_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, role, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id,
            user.name,
            user.email,
            user.role.as_str(),
            user.status.as_str(),
            user.created_at.format(TS_FMT).to_string(),
            user.updated_at.format(TS_FMT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        "SELECT id, name, email, role, status, created_at, updated_at FROM users WHERE id = ?1",
        params![id],
        |row| Ok(parse_user_row(row)),
    );

    match result {
        Ok(user) => Ok(Some(user?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Resolves a session token to its user. Expired sessions are invisible;
/// token issuance itself belongs to the external auth service.
pub fn get_user_by_session(conn: &Connection, token: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        "SELECT u.id, u.name, u.email, u.role, u.status, u.created_at, u.updated_at
         FROM sessions s
         INNER JOIN users u ON u.id = s.user_id
         WHERE s.token = ?1 AND s.expires_at > ?2",
        params![token, now_str()],
        |row| Ok(parse_user_row(row)),
    );

    match result {
        Ok(user) => Ok(Some(user?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn create_session(
    conn: &Connection,
    token: &str,
    user_id: &str,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token, user_id, expires_at.format(TS_FMT).to_string()],
    )?;
    Ok(())
}

pub fn list_users(
    conn: &Connection,
    role_filter: Option<Role>,
    limit: i64,
) -> anyhow::Result<Vec<User>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match role_filter {
        Some(role) => (
            "SELECT id, name, email, role, status, created_at, updated_at
             FROM users WHERE role = ?1 ORDER BY created_at DESC LIMIT ?2"
                .to_string(),
            vec![
                Box::new(role.as_str().to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            "SELECT id, name, email, role, status, created_at, updated_at
             FROM users ORDER BY created_at DESC LIMIT ?1"
                .to_string(),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_user_row(row)))?;

    let mut users = vec![];
    for row in rows {
        users.push(row??);
    }
    Ok(users)
}

pub fn update_user_moderation(
    conn: &Connection,
    id: &str,
    role: Option<Role>,
    status: Option<UserStatus>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET
           role = COALESCE(?1, role),
           status = COALESCE(?2, status),
           updated_at = ?3
         WHERE id = ?4",
        params![
            role.map(|r| r.as_str()),
            status.map(|s| s.as_str()),
            now_str(),
            id
        ],
    )?;
    Ok(count > 0)
}

fn parse_user_row(row: &rusqlite::Row) -> anyhow::Result<User> {
    let role_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let created_at_str: String = row.get(5)?;
    let updated_at_str: String = row.get(6)?;

    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: Role::parse(&role_str).unwrap_or(Role::Student),
        status: UserStatus::parse(&status_str).unwrap_or(UserStatus::Active),
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

// ── Tutor Profiles ──

pub fn create_tutor_profile(conn: &Connection, profile: &TutorProfile) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO tutor_profiles (id, user_id, bio, hourly_rate, rating, total_reviews, is_verified, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            profile.id,
            profile.user_id,
            profile.bio,
            profile.hourly_rate,
            profile.rating,
            profile.total_reviews,
            profile.is_verified as i32,
            profile.created_at.format(TS_FMT).to_string(),
            profile.updated_at.format(TS_FMT).to_string(),
        ],
    )?;
    Ok(())
}

const TUTOR_PROFILE_COLS: &str =
    "id, user_id, bio, hourly_rate, rating, total_reviews, is_verified, created_at, updated_at";

pub fn get_tutor_profile(conn: &Connection, id: &str) -> anyhow::Result<Option<TutorProfile>> {
    let result = conn.query_row(
        &format!("SELECT {TUTOR_PROFILE_COLS} FROM tutor_profiles WHERE id = ?1"),
        params![id],
        |row| Ok(parse_tutor_profile_row(row)),
    );

    match result {
        Ok(profile) => Ok(Some(profile?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_tutor_profile_by_user(
    conn: &Connection,
    user_id: &str,
) -> anyhow::Result<Option<TutorProfile>> {
    let result = conn.query_row(
        &format!("SELECT {TUTOR_PROFILE_COLS} FROM tutor_profiles WHERE user_id = ?1"),
        params![user_id],
        |row| Ok(parse_tutor_profile_row(row)),
    );

    match result {
        Ok(profile) => Ok(Some(profile?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_tutor_profile(
    conn: &Connection,
    id: &str,
    bio: Option<&str>,
    hourly_rate: Option<i64>,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE tutor_profiles SET
           bio = COALESCE(?1, bio),
           hourly_rate = COALESCE(?2, hourly_rate),
           updated_at = ?3
         WHERE id = ?4",
        params![bio, hourly_rate, now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn set_tutor_verified(conn: &Connection, id: &str, verified: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE tutor_profiles SET is_verified = ?1, updated_at = ?2 WHERE id = ?3",
        params![verified as i32, now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn update_tutor_rating(
    conn: &Connection,
    id: &str,
    rating: f64,
    total_reviews: i64,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE tutor_profiles SET rating = ?1, total_reviews = ?2, updated_at = ?3 WHERE id = ?4",
        params![rating, total_reviews, now_str(), id],
    )?;
    Ok(())
}

pub struct TutorListing {
    pub profile: TutorProfile,
    pub name: String,
    pub email: String,
}

pub struct TutorFilters {
    pub search: Option<String>,
    pub min_rating: Option<f64>,
    pub max_rate: Option<i64>,
    pub limit: i64,
}

/// Verified tutors only, best-rated first.
pub fn list_tutors(conn: &Connection, filters: &TutorFilters) -> anyhow::Result<Vec<TutorListing>> {
    let mut sql = format!(
        "SELECT {}, u.name, u.email
         FROM tutor_profiles tp
         INNER JOIN users u ON u.id = tp.user_id
         WHERE tp.is_verified = 1 AND u.role = 'TUTOR' AND u.status = 'ACTIVE'",
        TUTOR_PROFILE_COLS
            .split(", ")
            .map(|c| format!("tp.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(search) = &filters.search {
        params_vec.push(Box::new(format!("%{search}%")));
        let idx = params_vec.len();
        sql.push_str(&format!(
            " AND (u.name LIKE ?{idx} OR tp.bio LIKE ?{idx})"
        ));
    }
    if let Some(min_rating) = filters.min_rating {
        params_vec.push(Box::new(min_rating));
        sql.push_str(&format!(" AND tp.rating >= ?{}", params_vec.len()));
    }
    if let Some(max_rate) = filters.max_rate {
        params_vec.push(Box::new(max_rate));
        sql.push_str(&format!(" AND tp.hourly_rate <= ?{}", params_vec.len()));
    }

    params_vec.push(Box::new(filters.limit));
    sql.push_str(&format!(" ORDER BY tp.rating DESC LIMIT ?{}", params_vec.len()));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        let name: String = row.get(9)?;
        let email: String = row.get(10)?;
        Ok((parse_tutor_profile_row(row), name, email))
    })?;

    let mut tutors = vec![];
    for row in rows {
        let (profile, name, email) = row?;
        tutors.push(TutorListing {
            profile: profile?,
            name,
            email,
        });
    }
    Ok(tutors)
}

fn parse_tutor_profile_row(row: &rusqlite::Row) -> anyhow::Result<TutorProfile> {
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    Ok(TutorProfile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        bio: row.get(2)?,
        hourly_rate: row.get(3)?,
        rating: row.get(4)?,
        total_reviews: row.get(5)?,
        is_verified: row.get::<_, i32>(6)? != 0,
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

// ── Bookings ──

const BOOKING_COLS: &str = "id, student_id, tutor_id, date, start_time, end_time, status, total_amount, notes, created_at, updated_at";

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            booking.id,
            booking.student_id,
            booking.tutor_id,
            booking.date.format(DATE_FMT).to_string(),
            booking.start_time,
            booking.end_time,
            booking.status.as_str(),
            booking.total_amount,
            booking.notes,
            booking.created_at.format(TS_FMT).to_string(),
            booking.updated_at.format(TS_FMT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Bookings that occupy the conflict space for a tutor on one date:
/// status CONFIRMED or COMPLETED, optionally excluding one row (its own
/// row, when rescheduling).
pub fn get_blocking_bookings(
    conn: &Connection,
    tutor_id: &str,
    date: &NaiveDate,
    exclude_id: Option<&str>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLS} FROM bookings
         WHERE tutor_id = ?1 AND date = ?2
           AND status IN ('CONFIRMED', 'COMPLETED')
           AND (?3 IS NULL OR id != ?3)
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(
        params![tutor_id, date.format(DATE_FMT).to_string(), exclude_id],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now_str(), id],
    )?;
    Ok(count > 0)
}

/// Reschedule write: the new slot and (possibly unchanged) status land in
/// one statement, so there is no partial field commit.
pub fn update_booking_slot(
    conn: &Connection,
    id: &str,
    date: &NaiveDate,
    start_time: &str,
    end_time: &str,
    status: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET date = ?1, start_time = ?2, end_time = ?3, status = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            date.format(DATE_FMT).to_string(),
            start_time,
            end_time,
            status.as_str(),
            now_str(),
            id
        ],
    )?;
    Ok(count > 0)
}

pub fn list_student_bookings(
    conn: &Connection,
    student_id: &str,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    list_bookings_where(conn, "student_id = ?1", student_id, status_filter, limit)
}

pub fn list_tutor_bookings(
    conn: &Connection,
    tutor_id: &str,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    list_bookings_where(conn, "tutor_id = ?1", tutor_id, status_filter, limit)
}

fn list_bookings_where(
    conn: &Connection,
    owner_clause: &str,
    owner_id: &str,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut sql = format!("SELECT {BOOKING_COLS} FROM bookings WHERE {owner_clause}");
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> =
        vec![Box::new(owner_id.to_string())];

    if let Some(status) = status_filter {
        params_vec.push(Box::new(status.as_str().to_string()));
        sql.push_str(&format!(" AND status = ?{}", params_vec.len()));
    }

    params_vec.push(Box::new(limit));
    sql.push_str(&format!(" ORDER BY date DESC, start_time DESC LIMIT ?{}", params_vec.len()));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn list_all_bookings(
    conn: &Connection,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match status_filter {
        Some(status) => (
            format!(
                "SELECT {BOOKING_COLS} FROM bookings WHERE status = ?1
                 ORDER BY date DESC, start_time DESC LIMIT ?2"
            ),
            vec![
                Box::new(status.as_str().to_string()) as Box<dyn rusqlite::types::ToSql>,
                Box::new(limit),
            ],
        ),
        None => (
            format!(
                "SELECT {BOOKING_COLS} FROM bookings
                 ORDER BY date DESC, start_time DESC LIMIT ?1"
            ),
            vec![Box::new(limit) as Box<dyn rusqlite::types::ToSql>],
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub struct BookingParties {
    pub student_name: String,
    pub student_email: String,
    pub tutor_name: String,
    pub tutor_email: String,
}

pub fn get_booking_parties(conn: &Connection, booking: &Booking) -> anyhow::Result<BookingParties> {
    let parties = conn.query_row(
        "SELECT s.name, s.email, tu.name, tu.email
         FROM bookings b
         INNER JOIN users s ON s.id = b.student_id
         INNER JOIN tutor_profiles tp ON tp.id = b.tutor_id
         INNER JOIN users tu ON tu.id = tp.user_id
         WHERE b.id = ?1",
        params![booking.id],
        |row| {
            Ok(BookingParties {
                student_name: row.get(0)?,
                student_email: row.get(1)?,
                tutor_name: row.get(2)?,
                tutor_email: row.get(3)?,
            })
        },
    )?;
    Ok(parties)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date_str: String = row.get(3)?;
    let status_str: String = row.get(6)?;
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    let date = NaiveDate::parse_from_str(&date_str, DATE_FMT)
        .map_err(|e| anyhow::anyhow!("bad booking date {date_str}: {e}"))?;

    Ok(Booking {
        id: row.get(0)?,
        student_id: row.get(1)?,
        tutor_id: row.get(2)?,
        date,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        status: BookingStatus::parse(&status_str).unwrap_or(BookingStatus::Pending),
        total_amount: row.get(7)?,
        notes: row.get(8)?,
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

// ── Reviews ──

pub fn create_review(conn: &Connection, review: &Review) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO reviews (id, booking_id, student_id, rating, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            review.id,
            review.booking_id,
            review.student_id,
            review.rating,
            review.comment,
            review.created_at.format(TS_FMT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_review_by_booking(
    conn: &Connection,
    booking_id: &str,
) -> anyhow::Result<Option<Review>> {
    let result = conn.query_row(
        "SELECT id, booking_id, student_id, rating, comment, created_at
         FROM reviews WHERE booking_id = ?1",
        params![booking_id],
        |row| Ok(parse_review_row(row)),
    );

    match result {
        Ok(review) => Ok(Some(review?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Count and mean rating over every review attached to a tutor's bookings.
pub fn tutor_review_stats(conn: &Connection, tutor_id: &str) -> anyhow::Result<(i64, Option<f64>)> {
    let stats = conn.query_row(
        "SELECT COUNT(*), AVG(r.rating)
         FROM reviews r
         INNER JOIN bookings b ON b.id = r.booking_id
         WHERE b.tutor_id = ?1",
        params![tutor_id],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<f64>>(1)?)),
    )?;
    Ok(stats)
}

pub struct TutorReview {
    pub review: Review,
    pub student_name: String,
    pub booking_date: String,
}

pub fn list_tutor_reviews(conn: &Connection, tutor_id: &str) -> anyhow::Result<Vec<TutorReview>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.booking_id, r.student_id, r.rating, r.comment, r.created_at, u.name, b.date
         FROM reviews r
         INNER JOIN bookings b ON b.id = r.booking_id
         INNER JOIN users u ON u.id = r.student_id
         WHERE b.tutor_id = ?1
         ORDER BY r.created_at DESC",
    )?;

    let rows = stmt.query_map(params![tutor_id], |row| {
        let student_name: String = row.get(6)?;
        let booking_date: String = row.get(7)?;
        Ok((parse_review_row(row), student_name, booking_date))
    })?;

    let mut reviews = vec![];
    for row in rows {
        let (review, student_name, booking_date) = row?;
        reviews.push(TutorReview {
            review: review?,
            student_name,
            booking_date,
        });
    }
    Ok(reviews)
}

fn parse_review_row(row: &rusqlite::Row) -> anyhow::Result<Review> {
    let created_at_str: String = row.get(5)?;

    Ok(Review {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        student_id: row.get(2)?,
        rating: row.get(3)?,
        comment: row.get(4)?,
        created_at: parse_ts(&created_at_str),
    })
}

// ── Dashboard Stats ──

pub struct TutorStats {
    pub total_bookings: i64,
    pub completed_bookings: i64,
    pub cancelled_bookings: i64,
    pub upcoming_bookings: i64,
    pub total_earnings: i64,
}

pub fn get_tutor_stats(conn: &Connection, tutor_id: &str) -> anyhow::Result<TutorStats> {
    let stats = conn.query_row(
        "SELECT
           COUNT(*),
           COALESCE(SUM(status = 'COMPLETED'), 0),
           COALESCE(SUM(status = 'CANCELLED'), 0),
           COALESCE(SUM(status = 'CONFIRMED'), 0),
           COALESCE(SUM(CASE WHEN status = 'COMPLETED' THEN total_amount ELSE 0 END), 0)
         FROM bookings WHERE tutor_id = ?1",
        params![tutor_id],
        |row| {
            Ok(TutorStats {
                total_bookings: row.get(0)?,
                completed_bookings: row.get(1)?,
                cancelled_bookings: row.get(2)?,
                upcoming_bookings: row.get(3)?,
                total_earnings: row.get(4)?,
            })
        },
    )?;
    Ok(stats)
}

pub struct AdminStats {
    pub total_users: i64,
    pub total_tutors: i64,
    pub total_bookings: i64,
    pub total_reviews: i64,
}

pub fn get_admin_stats(conn: &Connection) -> anyhow::Result<AdminStats> {
    let total_users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let total_tutors: i64 =
        conn.query_row("SELECT COUNT(*) FROM tutor_profiles", [], |row| row.get(0))?;
    let total_bookings: i64 =
        conn.query_row("SELECT COUNT(*) FROM bookings", [], |row| row.get(0))?;
    let total_reviews: i64 =
        conn.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?;

    Ok(AdminStats {
        total_users,
        total_tutors,
        total_bookings,
        total_reviews,
    })
}
