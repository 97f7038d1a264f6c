// libs/booking-cell/src/services/lifecycle.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::{NotificationDispatcher, NotificationKind};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use vet_cell::models::AppointmentType;
use vet_cell::SlotAllocatorService;

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentHistoryEntry, AppointmentStatus,
};
use crate::services::meeting::MeetingLinkService;

/// The appointment state machine. All status mutation goes through
/// [`apply_transition`](AppointmentLifecycleService::apply_transition); every
/// applied transition appends one history row (best effort once the status
/// change is committed), and the side effects bound to specific transitions
/// (slot release, notifications, meeting links) fire from here and nowhere
/// else.
pub struct AppointmentLifecycleService {
    supabase: Arc<SupabaseClient>,
    allocator: SlotAllocatorService,
    notifications: Arc<NotificationDispatcher>,
    meeting: MeetingLinkService,
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig, notifications: Arc<NotificationDispatcher>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            allocator: SlotAllocatorService::with_client(Arc::clone(&supabase)),
            supabase,
            notifications,
            meeting: MeetingLinkService::new(config),
        }
    }

    /// Allowed next statuses for a given current status.
    ///
    /// ```text
    /// PENDING   -> CONFIRMED | CANCELLED
    /// CONFIRMED -> COMPLETED | CANCELLED | NO_SHOW
    /// COMPLETED, CANCELLED, NO_SHOW -> (terminal)
    /// ```
    pub fn valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn validate_status_transition(
        &self,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if !self.valid_transitions(from).contains(&to) {
            warn!("Invalid status transition attempted: {} -> {}", from, to);
            return Err(AppointmentError::InvalidTransition { from, to });
        }
        Ok(())
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// Validate and apply a status transition, with its bound side effects.
    ///
    /// Requesting the current status on a non-terminal appointment is treated
    /// as a plain notes/prescription update: no history row, no side effects.
    pub async fn apply_transition(
        &self,
        appointment_id: Uuid,
        to: AppointmentStatus,
        actor: Actor,
        reason: Option<String>,
        notes: Option<String>,
        prescription: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;

        if to == current.status {
            if current.status.is_terminal() {
                return Err(AppointmentError::InvalidTransition {
                    from: current.status,
                    to,
                });
            }
            return self
                .attach_fields(&current, notes, prescription, auth_token)
                .await;
        }

        self.validate_status_transition(current.status, to)?;

        let mut update = serde_json::Map::new();
        update.insert("status".to_string(), json!(to.to_string()));
        if let Some(notes) = notes {
            update.insert("notes".to_string(), json!(notes));
        }
        if let Some(prescription) = prescription {
            update.insert("prescription".to_string(), json!(prescription));
        }

        // Entering CONFIRMED on a video appointment mints the meeting link if
        // one was never generated.
        if to == AppointmentStatus::Confirmed
            && current.appointment_type == AppointmentType::Video
            && current.meeting_link.is_none()
        {
            update.insert("meeting_link".to_string(), json!(self.meeting.generate()));
        }

        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated = self
            .patch_appointment(appointment_id, Value::Object(update), auth_token)
            .await?;

        // The status change is committed at this point. The transition-bound
        // side effects and the audit row are both best-effort from here:
        // failing either must not strand a CANCELLED appointment with its
        // seat still held.
        if to == AppointmentStatus::Cancelled {
            self.handle_cancellation(&updated, auth_token).await;
        }

        let reason = reason.unwrap_or_else(|| format!("status changed to {}", to));
        if let Err(e) = self
            .record_history(appointment_id, Some(current.status), to, &reason, actor, auth_token)
            .await
        {
            warn!(
                "Failed to record history for appointment {} ({} -> {}): {}",
                appointment_id, current.status, to, e
            );
        }

        info!(
            "Appointment {} transitioned {} -> {} by {}",
            appointment_id, current.status, to, actor.role
        );

        Ok(updated)
    }

    /// Append one audit row. Insert-only; rows are never updated or deleted.
    pub async fn record_history(
        &self,
        appointment_id: Uuid,
        from: Option<AppointmentStatus>,
        to: AppointmentStatus,
        reason: &str,
        actor: Actor,
        auth_token: &str,
    ) -> Result<AppointmentHistoryEntry, AppointmentError> {
        let row = json!({
            "appointment_id": appointment_id,
            "from_status": from.map(|s| s.to_string()),
            "to_status": to.to_string(),
            "reason": reason,
            "changed_by": actor.user_id,
            "changed_by_role": actor.role.to_string(),
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointment_history",
                Some(auth_token),
                Some(row),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError(
                "Failed to record appointment history".to_string(),
            ));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse history row: {}", e)))
    }

    pub async fn get_history(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AppointmentHistoryEntry>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointment_history?appointment_id=eq.{}&order=created_at.asc",
            appointment_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AppointmentHistoryEntry>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse history: {}", e)))
    }

    async fn attach_fields(
        &self,
        current: &Appointment,
        notes: Option<String>,
        prescription: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mut update = serde_json::Map::new();
        if let Some(notes) = notes {
            update.insert("notes".to_string(), json!(notes));
        }
        if let Some(prescription) = prescription {
            update.insert("prescription".to_string(), json!(prescription));
        }
        if update.is_empty() {
            return Ok(current.clone());
        }
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        debug!("Attaching notes/prescription to appointment {}", current.id);
        self.patch_appointment(current.id, Value::Object(update), auth_token)
            .await
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update), Some(headers))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// Cancellation frees the reserved seat and tells both parties. The status
    /// change is already committed at this point, so a failed release is
    /// logged rather than surfaced - a NO_SHOW by contrast never touches the
    /// slot, its capacity stays consumed.
    async fn handle_cancellation(&self, appointment: &Appointment, auth_token: &str) {
        if let Some(slot_id) = appointment.slot_id {
            if let Err(e) = self.allocator.release(slot_id, auth_token).await {
                warn!(
                    "Failed to release slot {} for cancelled appointment {}: {}",
                    slot_id, appointment.id, e
                );
            }
        }

        let payload = json!({
            "appointment_id": appointment.id,
            "reference_number": appointment.reference_number,
            "scheduled_time": appointment.scheduled_time.to_rfc3339()
        });
        self.notifications
            .send(appointment.owner_id, NotificationKind::Cancellation, payload.clone());
        self.notifications
            .send(appointment.veterinarian_id, NotificationKind::Cancellation, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notification_cell::{DispatcherConfig, LogChannel};
    use shared_utils::test_utils::TestConfig;

    fn service() -> AppointmentLifecycleService {
        let dispatcher =
            NotificationDispatcher::start(Arc::new(LogChannel), DispatcherConfig::default());
        AppointmentLifecycleService::new(&TestConfig::default().to_app_config(), dispatcher)
    }

    #[tokio::test]
    async fn pending_can_confirm_or_cancel() {
        let s = service();
        assert!(s
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Confirmed)
            .is_ok());
        assert!(s
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Cancelled)
            .is_ok());
        assert!(s
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Completed)
            .is_err());
        assert!(s
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::NoShow)
            .is_err());
    }

    #[tokio::test]
    async fn confirmed_can_complete_cancel_or_no_show() {
        let s = service();
        for to in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert!(s
                .validate_status_transition(AppointmentStatus::Confirmed, to)
                .is_ok());
        }
        assert!(s
            .validate_status_transition(AppointmentStatus::Confirmed, AppointmentStatus::Pending)
            .is_err());
    }

    #[tokio::test]
    async fn terminal_states_are_closed() {
        let s = service();
        let all = [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ];
        for terminal in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert!(s.valid_transitions(terminal).is_empty());
            for to in all {
                assert!(
                    s.validate_status_transition(terminal, to).is_err(),
                    "{} -> {} should be rejected",
                    terminal,
                    to
                );
            }
        }
    }
}
