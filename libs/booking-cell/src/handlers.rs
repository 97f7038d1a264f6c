// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use vet_cell::models::SlotError;

use crate::models::{
    Actor, Appointment, AppointmentError, CancelBookingRequest, ChangedByRole,
    CompleteBookingRequest, UpcomingAppointmentsQuery, UpdateStatusRequest,
};
use crate::services::booking::BookingOrchestratorService;
use crate::services::lifecycle::AppointmentLifecycleService;

/// Shared state for the booking surface. The dispatcher is process-wide; the
/// orchestrator is rebuilt per request like the other services.
#[derive(Clone)]
pub struct BookingState {
    pub config: Arc<AppConfig>,
    pub notifications: Arc<NotificationDispatcher>,
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::PetNotFound => AppError::NotFound("Pet not found".to_string()),
        AppointmentError::VetNotFound => AppError::NotFound("Veterinarian not found".to_string()),
        AppointmentError::Slot(SlotError::NotFound) => {
            AppError::NotFound("Slot not found".to_string())
        }
        AppointmentError::Slot(SlotError::Full) | AppointmentError::Conflict => {
            AppError::Conflict("Slot is no longer available".to_string())
        }
        AppointmentError::Slot(SlotError::Cancelled) => {
            AppError::Conflict("Slot was cancelled".to_string())
        }
        AppointmentError::Slot(SlotError::Contended) => {
            AppError::Conflict("Slot is contended, retry".to_string())
        }
        AppointmentError::Slot(SlotError::Expired) => {
            AppError::BadRequest("Slot start time is in the past".to_string())
        }
        AppointmentError::Slot(SlotError::TypeMismatch { requested }) => AppError::BadRequest(
            format!("Slot does not support {} appointments", requested),
        ),
        AppointmentError::Slot(SlotError::Invalid(msg)) => AppError::ValidationError(msg),
        AppointmentError::Slot(SlotError::DatabaseError(msg)) => AppError::Database(msg),
        AppointmentError::InvalidTransition { from, to } => {
            AppError::BadRequest(format!("Invalid status transition: {} -> {}", from, to))
        }
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn actor_for(user: &User) -> Result<Actor, AppError> {
    let user_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;
    let role = if user.is_admin() {
        ChangedByRole::Admin
    } else if user.is_vet() {
        ChangedByRole::Vet
    } else {
        ChangedByRole::Owner
    };
    Ok(Actor { user_id, role })
}

fn can_access(user: &User, appointment: &Appointment) -> bool {
    user.is_admin()
        || user.id == appointment.owner_id.to_string()
        || (user.is_vet() && user.id == appointment.veterinarian_id.to_string())
}

/// POST /bookings - the commit step of the booking protocol.
#[axum::debug_handler]
pub async fn complete_booking(
    State(state): State<BookingState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_for(&user)?;
    let service = BookingOrchestratorService::new(&state.config, state.notifications.clone());

    let confirmation = service
        .complete_booking(request, actor.user_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "booking": confirmation })))
}

/// POST /bookings/{appointment_id}/cancel
#[axum::debug_handler]
pub async fn cancel_booking(
    State(state): State<BookingState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_for(&user)?;
    let service = BookingOrchestratorService::new(&state.config, state.notifications.clone());

    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;
    if !can_access(&user, &appointment) {
        return Err(AppError::Auth(
            "Not authorized to cancel this appointment".to_string(),
        ));
    }

    let appointment = service
        .cancel_booking(appointment_id, request.reason, actor, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

/// PUT /bookings/{appointment_id}/status - vet/admin only. Confirmation,
/// completion and no-show all go through here.
#[axum::debug_handler]
pub async fn update_status(
    State(state): State<BookingState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_vet() && !user.is_admin() {
        return Err(AppError::Auth(
            "Only veterinarians can update appointment status".to_string(),
        ));
    }

    let actor = actor_for(&user)?;
    let service = BookingOrchestratorService::new(&state.config, state.notifications.clone());

    if !user.is_admin() {
        let appointment = service
            .get_appointment(appointment_id, auth.token())
            .await
            .map_err(map_appointment_error)?;
        if user.id != appointment.veterinarian_id.to_string() {
            return Err(AppError::Auth(
                "Not authorized to update this appointment".to_string(),
            ));
        }
    }

    let appointment = service
        .update_status(appointment_id, request, actor, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "success": true, "appointment": appointment })))
}

/// GET /bookings/{appointment_id} - appointment with its audit trail.
#[axum::debug_handler]
pub async fn get_booking(
    State(state): State<BookingState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = BookingOrchestratorService::new(&state.config, state.notifications.clone());
    let lifecycle = AppointmentLifecycleService::new(&state.config, state.notifications.clone());

    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;
    if !can_access(&user, &appointment) {
        return Err(AppError::Auth(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    let history = lifecycle
        .get_history(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointment": appointment, "history": history })))
}

/// GET /bookings/upcoming - the caller's active bookings in the near window.
#[axum::debug_handler]
pub async fn get_upcoming_bookings(
    State(state): State<BookingState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<UpcomingAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_for(&user)?;
    let service = BookingOrchestratorService::new(&state.config, state.notifications.clone());

    let hours_ahead = query.hours_ahead.unwrap_or(48).clamp(1, 24 * 30);
    let appointments = service
        .get_upcoming_appointments(actor.user_id, hours_ahead, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let count = appointments.len();
    Ok(Json(json!({ "appointments": appointments, "count": count })))
}
