// libs/booking-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use vet_cell::models::{AppointmentType, SlotError};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub pet_id: Uuid,
    pub owner_id: Uuid,
    pub veterinarian_id: Uuid,
    pub slot_id: Option<Uuid>,
    pub scheduled_time: DateTime<Utc>,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub reference_number: String,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
    pub prescription: Option<String>,
    pub reminder_24h_sent_at: Option<DateTime<Utc>>,
    pub reminder_1h_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Terminal states admit no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// Who performed a status change, for the audit trail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangedByRole {
    Owner,
    Vet,
    Admin,
    System,
}

impl fmt::Display for ChangedByRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangedByRole::Owner => write!(f, "owner"),
            ChangedByRole::Vet => write!(f, "vet"),
            ChangedByRole::Admin => write!(f, "admin"),
            ChangedByRole::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: ChangedByRole,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            user_id: Uuid::nil(),
            role: ChangedByRole::System,
        }
    }
}

/// Append-only audit record, one row per applied transition. Never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentHistoryEntry {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub from_status: Option<AppointmentStatus>,
    pub to_status: AppointmentStatus,
    pub reason: String,
    pub changed_by: Uuid,
    pub changed_by_role: ChangedByRole,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteBookingRequest {
    pub veterinarian_id: Uuid,
    pub slot_id: Uuid,
    pub pet_id: Uuid,
    pub appointment_type: AppointmentType,
    pub reason: Option<String>,
    pub agreed_to_terms: bool,
    pub confirmed_pet_details: bool,
    pub confirmed_appointment_details: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    pub reference_number: String,
    pub seat_number: i32,
    pub meeting_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub prescription: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingAppointmentsQuery {
    pub hours_ahead: Option<i64>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Pet not found")]
    PetNotFound,

    #[error("Veterinarian not found")]
    VetNotFound,

    #[error("Slot unavailable: {0}")]
    Slot(#[from] SlotError),

    #[error("Booking conflict: slot was taken by another caller")]
    Conflict,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!AppointmentStatus::Pending.is_terminal());
        assert!(!AppointmentStatus::Confirmed.is_terminal());
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
        assert!(AppointmentStatus::NoShow.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AppointmentStatus::NoShow).unwrap(),
            "\"no_show\""
        );
        assert_eq!(AppointmentStatus::NoShow.to_string(), "no_show");
    }
}
