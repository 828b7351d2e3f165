pub mod admin;
pub mod bookings;
pub mod health;
pub mod reviews;
pub mod tutor;
pub mod tutors;

use serde::Serialize;

/// Success envelope: payloads sit under "data", matching the error
/// envelope's "error" key.
#[derive(Serialize)]
pub struct Data<T> {
    pub data: T,
}
