// libs/notification-cell/src/handlers.rs
use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use shared_models::error::AppError;

use crate::services::dispatcher::NotificationDispatcher;

/// GET /notifications/failed - operational listing of deliveries that
/// exhausted their retry budget. Admin surface, read-only.
#[axum::debug_handler]
pub async fn list_failed_deliveries(
    State(dispatcher): State<Arc<NotificationDispatcher>>,
) -> Result<Json<Value>, AppError> {
    let failed = dispatcher.failed_deliveries().await;

    Ok(Json(json!({
        "count": failed.len(),
        "failed": failed
    })))
}
