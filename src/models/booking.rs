use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub student_id: String,
    /// References the tutor's profile, not the tutor's user account.
    pub tutor_id: String,
    /// Calendar date only; no time zone attached.
    pub date: NaiveDate,
    /// Zero-padded "HH:MM". Intervals are half-open: [start_time, end_time).
    pub start_time: String,
    pub end_time: String,
    pub status: BookingStatus,
    /// Tutor's hourly rate snapshotted at creation time.
    pub total_amount: i64,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "COMPLETED" => Some(BookingStatus::Completed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Only CONFIRMED and COMPLETED bookings occupy a slot in the
    /// conflict space.
    pub fn blocks_slot(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Completed)
    }

    /// PENDING -> CONFIRMED -> COMPLETED, with CANCELLED reachable from
    /// PENDING or CONFIRMED. COMPLETED and CANCELLED are terminal.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}
