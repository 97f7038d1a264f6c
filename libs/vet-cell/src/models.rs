// libs/vet-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// VETERINARIAN MODELS
// ==============================================================================

/// Veterinarian identity and clinic metadata. Looked up, never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vet {
    pub id: Uuid,
    pub full_name: String,
    pub clinic_name: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum VetError {
    #[error("Veterinarian not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Booked,
    Cancelled,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Available => write!(f, "available"),
            SlotStatus::Booked => write!(f, "booked"),
            SlotStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Consultation mode requested by the owner when booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Video,
    InClinic,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Video => write!(f, "video"),
            AppointmentType::InClinic => write!(f, "in_clinic"),
        }
    }
}

/// Consultation modes a slot is published for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SupportedMode {
    Video,
    InClinic,
    Both,
}

impl SupportedMode {
    pub fn supports(&self, appointment_type: AppointmentType) -> bool {
        match self {
            SupportedMode::Both => true,
            SupportedMode::Video => appointment_type == AppointmentType::Video,
            SupportedMode::InClinic => appointment_type == AppointmentType::InClinic,
        }
    }
}

impl fmt::Display for SupportedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupportedMode::Video => write!(f, "video"),
            SupportedMode::InClinic => write!(f, "in_clinic"),
            SupportedMode::Both => write!(f, "both"),
        }
    }
}

/// A vet-published, capacity-bounded availability window.
///
/// Invariant: `0 <= booked_count <= capacity`, and `status == Booked` exactly
/// when `booked_count >= capacity`. Capacity fields are mutated only by the
/// allocator's compare-and-swap updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub veterinarian_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: i32,
    pub booked_count: i32,
    pub status: SlotStatus,
    pub supported_mode: SupportedMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn remaining_capacity(&self) -> i32 {
        (self.capacity - self.booked_count).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.booked_count >= self.capacity
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }

    pub fn supports(&self, appointment_type: AppointmentType) -> bool {
        self.supported_mode.supports(appointment_type)
    }
}

/// Evidence that one unit of a slot's capacity was consumed by this caller.
/// `seat_number` is the booked count after the winning compare-and-swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotReservation {
    pub slot_id: Uuid,
    pub seat_number: i32,
    pub reserved_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: i32,
    pub supported_mode: SupportedMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSlotsQuery {
    pub veterinarian_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub appointment_type: Option<AppointmentType>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SlotError {
    #[error("Slot not found")]
    NotFound,

    #[error("Slot capacity exhausted")]
    Full,

    #[error("Slot start time is in the past")]
    Expired,

    #[error("Slot was cancelled by the veterinarian")]
    Cancelled,

    #[error("Slot does not support {requested} appointments")]
    TypeMismatch { requested: AppointmentType },

    #[error("Slot update contended, caller should retry")]
    Contended,

    #[error("Invalid slot definition: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn slot(capacity: i32, booked: i32, mode: SupportedMode) -> Slot {
        let start = Utc::now() + Duration::hours(24);
        Slot {
            id: Uuid::new_v4(),
            veterinarian_id: Uuid::new_v4(),
            start_time: start,
            end_time: start + Duration::minutes(30),
            capacity,
            booked_count: booked,
            status: if booked >= capacity { SlotStatus::Booked } else { SlotStatus::Available },
            supported_mode: mode,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn remaining_capacity_never_negative() {
        let s = slot(2, 3, SupportedMode::Both);
        assert_eq!(s.remaining_capacity(), 0);
        assert!(s.is_full());
    }

    #[test]
    fn mode_support_matrix() {
        assert!(SupportedMode::Both.supports(AppointmentType::Video));
        assert!(SupportedMode::Both.supports(AppointmentType::InClinic));
        assert!(SupportedMode::Video.supports(AppointmentType::Video));
        assert!(!SupportedMode::Video.supports(AppointmentType::InClinic));
        assert!(!SupportedMode::InClinic.supports(AppointmentType::Video));
    }

    #[test]
    fn slot_supports_delegates_to_mode() {
        let s = slot(1, 0, SupportedMode::InClinic);
        assert!(s.supports(AppointmentType::InClinic));
        assert!(!s.supports(AppointmentType::Video));
    }

    #[test]
    fn started_slot_detection() {
        let mut s = slot(1, 0, SupportedMode::Both);
        assert!(!s.has_started(Utc::now()));
        s.start_time = Utc::now() - Duration::minutes(1);
        assert!(s.has_started(Utc::now()));
    }
}
