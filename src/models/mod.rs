pub mod booking;
pub mod review;
pub mod tutor;
pub mod user;

pub use booking::{Booking, BookingStatus};
pub use review::Review;
pub use tutor::TutorProfile;
pub use user::{Role, User, UserStatus};
