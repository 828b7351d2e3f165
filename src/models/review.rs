use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One review per booking, written once by the booking's student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub booking_id: String,
    pub student_id: String,
    /// 1 to 5 inclusive.
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: NaiveDateTime,
}
