use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The bookable identity of a tutor, distinct from the user account that
/// owns it. `rating` and `total_reviews` are maintained by the rating
/// aggregator (full recompute on every review submission).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorProfile {
    pub id: String,
    pub user_id: String,
    pub bio: Option<String>,
    /// Smallest currency unit per hour. Snapshotted onto bookings at
    /// creation time; later rate changes never touch existing bookings.
    pub hourly_rate: i64,
    pub rating: f64,
    pub total_reviews: i64,
    pub is_verified: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
