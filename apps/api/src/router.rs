use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use booking_cell::{booking_routes, BookingState};
use notification_cell::{notification_routes, NotificationDispatcher};
use shared_config::AppConfig;
use vet_cell::router::{slot_routes, vet_routes};

pub fn create_router(state: Arc<AppConfig>, notifications: Arc<NotificationDispatcher>) -> Router {
    let booking_state = BookingState {
        config: state.clone(),
        notifications: notifications.clone(),
    };

    Router::new()
        .route("/", get(|| async { "VetBook API is running!" }))
        .nest("/api/vets", vet_routes(state.clone()))
        .nest("/api/slots", slot_routes(state.clone()))
        .nest("/api/bookings", booking_routes(booking_state))
        .nest("/api/notifications", notification_routes(state, notifications))
}
