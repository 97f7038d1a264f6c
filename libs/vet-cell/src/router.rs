// libs/vet-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn vet_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/{vet_id}", get(handlers::get_vet))
        .route("/{vet_id}/slots", post(handlers::create_slot))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}

pub fn slot_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/open", get(handlers::list_open_slots))
        .route("/{slot_id}/validate", get(handlers::validate_slot))
        .route("/{slot_id}/cancel", post(handlers::cancel_slot))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
