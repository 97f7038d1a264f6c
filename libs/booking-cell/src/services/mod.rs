// libs/booking-cell/src/services/mod.rs
pub mod booking;
pub mod lifecycle;
pub mod meeting;
