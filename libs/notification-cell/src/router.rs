// libs/notification-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::dispatcher::NotificationDispatcher;

pub fn notification_routes(
    config: Arc<AppConfig>,
    dispatcher: Arc<NotificationDispatcher>,
) -> Router {
    let protected_routes = Router::new()
        .route("/failed", get(handlers::list_failed_deliveries))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(dispatcher)
}
