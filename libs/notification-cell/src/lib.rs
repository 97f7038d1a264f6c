// libs/notification-cell/src/lib.rs
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{DeliveryRecord, DeliveryState, DispatcherConfig, NotificationKind, NotificationRequest};
pub use router::notification_routes;
pub use services::dispatcher::{LogChannel, NotificationChannel, NotificationDispatcher};
