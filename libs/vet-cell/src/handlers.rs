// libs/vet-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateSlotRequest, OpenSlotsQuery, SlotError, VetError};
use crate::services::slots::SlotStoreService;
use crate::services::vet::VetLookupService;

fn map_slot_error(e: SlotError) -> AppError {
    match e {
        SlotError::NotFound => AppError::NotFound("Slot not found".to_string()),
        SlotError::Full => AppError::Conflict("Slot capacity exhausted".to_string()),
        SlotError::Expired => AppError::BadRequest("Slot start time is in the past".to_string()),
        SlotError::Cancelled => AppError::Conflict("Slot was cancelled".to_string()),
        SlotError::TypeMismatch { requested } => AppError::BadRequest(format!(
            "Slot does not support {} appointments",
            requested
        )),
        SlotError::Contended => AppError::Conflict("Slot is contended, retry".to_string()),
        SlotError::Invalid(msg) => AppError::ValidationError(msg),
        SlotError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// GET /vets/{vet_id} - the booking protocol's validate-vet step.
#[axum::debug_handler]
pub async fn get_vet(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(vet_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = VetLookupService::new(&state);

    let vet = service.get_vet(vet_id, auth.token()).await.map_err(|e| match e {
        VetError::NotFound => AppError::NotFound("Veterinarian not found".to_string()),
        VetError::DatabaseError(msg) => AppError::Database(msg),
    })?;

    Ok(Json(json!({ "veterinarian": vet })))
}

/// POST /vets/{vet_id}/slots - publish an availability window.
#[axum::debug_handler]
pub async fn create_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(vet_id): Path<Uuid>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let is_owner_vet = user.is_vet() && user.id == vet_id.to_string();
    if !is_owner_vet && !user.is_admin() {
        return Err(AppError::Auth(
            "Not authorized to publish slots for this veterinarian".to_string(),
        ));
    }

    let service = SlotStoreService::new(&state);
    let slot = service
        .create_slot(vet_id, request, auth.token())
        .await
        .map_err(map_slot_error)?;

    Ok(Json(json!({ "success": true, "slot": slot })))
}

/// GET /slots/open - owner-facing browse of open future windows.
#[axum::debug_handler]
pub async fn list_open_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<OpenSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let service = SlotStoreService::new(&state);
    let slots = service
        .list_open_slots(query, auth.token())
        .await
        .map_err(map_slot_error)?;

    Ok(Json(json!({ "slots": slots })))
}

#[derive(Debug, serde::Deserialize)]
pub struct ValidateSlotQuery {
    pub appointment_type: crate::models::AppointmentType,
}

/// GET /slots/{slot_id}/validate - advisory validate-slot step. The
/// authoritative check happens at booking commit.
#[axum::debug_handler]
pub async fn validate_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(slot_id): Path<Uuid>,
    Query(query): Query<ValidateSlotQuery>,
) -> Result<Json<Value>, AppError> {
    let service = SlotStoreService::new(&state);
    let slot = service
        .validate_slot(slot_id, query.appointment_type, auth.token())
        .await
        .map_err(map_slot_error)?;

    Ok(Json(json!({
        "slot": slot,
        "remaining_capacity": slot.remaining_capacity()
    })))
}

/// POST /slots/{slot_id}/cancel - vet withdraws a window.
#[axum::debug_handler]
pub async fn cancel_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = SlotStoreService::new(&state);

    if !user.is_admin() {
        let slot = service.get_slot(slot_id, auth.token()).await.map_err(map_slot_error)?;
        let is_owner_vet = user.is_vet() && user.id == slot.veterinarian_id.to_string();
        if !is_owner_vet {
            return Err(AppError::Auth(
                "Not authorized to cancel this slot".to_string(),
            ));
        }
    }

    let slot = service
        .cancel_slot(slot_id, auth.token())
        .await
        .map_err(map_slot_error)?;

    Ok(Json(json!({ "success": true, "slot": slot })))
}
