// libs/booking-cell/src/router.rs
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, BookingState};

pub fn booking_routes(state: BookingState) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::complete_booking))
        .route("/upcoming", get(handlers::get_upcoming_bookings))
        .route("/{appointment_id}", get(handlers::get_booking))
        .route("/{appointment_id}/cancel", post(handlers::cancel_booking))
        .route("/{appointment_id}/status", put(handlers::update_status))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new().merge(protected_routes).with_state(state)
}
