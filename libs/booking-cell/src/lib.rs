// libs/booking-cell/src/lib.rs
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Appointment, AppointmentError, AppointmentHistoryEntry, AppointmentStatus, BookingConfirmation,
    ChangedByRole, CompleteBookingRequest,
};
pub use handlers::BookingState;
pub use router::booking_routes;
pub use services::booking::BookingOrchestratorService;
pub use services::lifecycle::AppointmentLifecycleService;
