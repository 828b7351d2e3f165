pub mod rating;
pub mod scheduling;
