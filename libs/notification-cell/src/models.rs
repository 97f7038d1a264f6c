// libs/notification-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmed,
    BookingAlert,
    Cancellation,
    Reminder24h,
    Reminder1h,
    VetDailyDigest,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::BookingConfirmed => write!(f, "booking_confirmed"),
            NotificationKind::BookingAlert => write!(f, "booking_alert"),
            NotificationKind::Cancellation => write!(f, "cancellation"),
            NotificationKind::Reminder24h => write!(f, "reminder_24h"),
            NotificationKind::Reminder1h => write!(f, "reminder_1h"),
            NotificationKind::VetDailyDigest => write!(f, "vet_daily_digest"),
        }
    }
}

/// One "send X to user Y" request. Transport is an external collaborator;
/// this cell only decides that and what to send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Delivered,
    Failed,
}

/// Retry bookkeeping for a finished delivery attempt sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub request: NotificationRequest,
    pub attempts: u32,
    pub state: DeliveryState,
    pub last_error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}
