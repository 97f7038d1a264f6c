// libs/booking-cell/src/services/booking.rs
use chrono::{Duration as ChronoDuration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::{NotificationDispatcher, NotificationKind};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use vet_cell::models::{AppointmentType, Slot, SlotError, Vet, VetError};
use vet_cell::{SlotAllocatorService, SlotStoreService, VetLookupService};

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentStatus, BookingConfirmation,
    CompleteBookingRequest, UpdateStatusRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::meeting::MeetingLinkService;

/// Executes the three-step booking protocol as one logical unit of work:
/// validate vet, validate slot (advisory), then commit through the slot
/// allocator. The advisory checks can go stale under concurrent load; only
/// the allocator's compare-and-swap at commit time is authoritative.
pub struct BookingOrchestratorService {
    supabase: Arc<SupabaseClient>,
    vets: VetLookupService,
    slots: SlotStoreService,
    allocator: SlotAllocatorService,
    lifecycle: AppointmentLifecycleService,
    notifications: Arc<NotificationDispatcher>,
    meeting: MeetingLinkService,
}

impl BookingOrchestratorService {
    pub fn new(config: &AppConfig, notifications: Arc<NotificationDispatcher>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            vets: VetLookupService::with_client(Arc::clone(&supabase)),
            slots: SlotStoreService::with_client(Arc::clone(&supabase)),
            allocator: SlotAllocatorService::with_client(Arc::clone(&supabase)),
            lifecycle: AppointmentLifecycleService::new(config, Arc::clone(&notifications)),
            supabase,
            notifications,
            meeting: MeetingLinkService::new(config),
        }
    }

    /// Step 1 of the booking protocol. Read-only.
    pub async fn validate_vet(&self, vet_id: Uuid, auth_token: &str) -> Result<Vet, AppointmentError> {
        self.vets.get_vet(vet_id, auth_token).await.map_err(|e| match e {
            VetError::NotFound => AppointmentError::VetNotFound,
            VetError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        })
    }

    /// Step 2 of the booking protocol. Advisory; commit re-checks.
    pub async fn validate_slot(
        &self,
        slot_id: Uuid,
        appointment_type: AppointmentType,
        auth_token: &str,
    ) -> Result<Slot, AppointmentError> {
        self.slots
            .validate_slot(slot_id, appointment_type, auth_token)
            .await
            .map_err(AppointmentError::from)
    }

    /// Step 3: validate-then-commit. On any failure before the reservation,
    /// nothing is persisted; a reservation that cannot be turned into an
    /// appointment is released again.
    pub async fn complete_booking(
        &self,
        request: CompleteBookingRequest,
        owner_id: Uuid,
        auth_token: &str,
    ) -> Result<BookingConfirmation, AppointmentError> {
        info!(
            "Completing booking for pet {} on slot {}",
            request.pet_id, request.slot_id
        );

        self.validate_confirmations(&request)?;
        self.validate_vet(request.veterinarian_id, auth_token).await?;
        self.verify_pet_exists(request.pet_id, auth_token).await?;

        // Advisory freshness check; the reserve below is the authoritative one.
        let slot = self
            .validate_slot(request.slot_id, request.appointment_type, auth_token)
            .await?;

        let reservation = self
            .allocator
            .reserve(request.slot_id, auth_token)
            .await
            .map_err(|e| match e {
                SlotError::Full | SlotError::Contended => AppointmentError::Conflict,
                other => AppointmentError::Slot(other),
            })?;

        let appointment = match self
            .create_appointment_record(&request, &slot, owner_id, auth_token)
            .await
        {
            Ok(appointment) => appointment,
            Err(e) => {
                // The seat was consumed but no appointment references it.
                warn!(
                    "Appointment insert failed after reservation on slot {}, releasing seat",
                    request.slot_id
                );
                if let Err(release_err) = self.allocator.release(request.slot_id, auth_token).await {
                    warn!(
                        "Compensating release for slot {} failed: {}",
                        request.slot_id, release_err
                    );
                }
                return Err(e);
            }
        };

        let actor = Actor {
            user_id: owner_id,
            role: crate::models::ChangedByRole::Owner,
        };
        let history_reason = request.reason.as_deref().unwrap_or("booking created");
        let mut history_result = self
            .lifecycle
            .record_history(
                appointment.id,
                None,
                AppointmentStatus::Pending,
                history_reason,
                actor,
                auth_token,
            )
            .await;
        if history_result.is_err() {
            // One retry covers a transient insert failure; beyond that the
            // booking stands without its initial audit row.
            history_result = self
                .lifecycle
                .record_history(
                    appointment.id,
                    None,
                    AppointmentStatus::Pending,
                    history_reason,
                    actor,
                    auth_token,
                )
                .await;
        }
        if let Err(e) = history_result {
            warn!("Failed to record initial history for appointment {}: {}", appointment.id, e);
        }

        let payload = json!({
            "appointment_id": appointment.id,
            "reference_number": appointment.reference_number,
            "scheduled_time": appointment.scheduled_time.to_rfc3339(),
            "appointment_type": appointment.appointment_type.to_string()
        });
        self.notifications
            .send(owner_id, NotificationKind::BookingConfirmed, payload.clone());
        self.notifications
            .send(appointment.veterinarian_id, NotificationKind::BookingAlert, payload);

        info!(
            "Booking committed: appointment {} (reference {}, seat {}/{})",
            appointment.id, appointment.reference_number, reservation.seat_number, slot.capacity
        );

        Ok(BookingConfirmation {
            reference_number: appointment.reference_number.clone(),
            seat_number: reservation.seat_number,
            meeting_link: appointment.meeting_link.clone(),
            appointment,
        })
    }

    /// Cancel via the state machine; slot release and the cancellation
    /// notifications are side effects of entering CANCELLED.
    pub async fn cancel_booking(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle
            .apply_transition(
                appointment_id,
                AppointmentStatus::Cancelled,
                actor,
                reason,
                None,
                None,
                auth_token,
            )
            .await
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        request: UpdateStatusRequest,
        actor: Actor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle
            .apply_transition(
                appointment_id,
                request.status,
                actor,
                request.reason,
                request.notes,
                request.prescription,
                auth_token,
            )
            .await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle.get_appointment(appointment_id, auth_token).await
    }

    /// Active appointments for a user within the next `hours_ahead` hours.
    pub async fn get_upcoming_appointments(
        &self,
        owner_id: Uuid,
        hours_ahead: i64,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let now = Utc::now();
        let until = now + ChronoDuration::hours(hours_ahead);

        let encoded_now = urlencoding::encode(&now.to_rfc3339()).into_owned();
        let encoded_until = urlencoding::encode(&until.to_rfc3339()).into_owned();
        let path = format!(
            "/rest/v1/appointments?owner_id=eq.{}&scheduled_time=gte.{}&scheduled_time=lte.{}&order=scheduled_time.asc",
            owner_id, encoded_now, encoded_until
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let mut appointments: Vec<Appointment> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))?;

        appointments.retain(|apt| {
            matches!(
                apt.status,
                AppointmentStatus::Pending | AppointmentStatus::Confirmed
            )
        });

        Ok(appointments)
    }

    fn validate_confirmations(&self, request: &CompleteBookingRequest) -> Result<(), AppointmentError> {
        if !request.agreed_to_terms {
            return Err(AppointmentError::ValidationError(
                "Terms of service must be accepted".to_string(),
            ));
        }
        if !request.confirmed_pet_details {
            return Err(AppointmentError::ValidationError(
                "Pet details must be confirmed".to_string(),
            ));
        }
        if !request.confirmed_appointment_details {
            return Err(AppointmentError::ValidationError(
                "Appointment details must be confirmed".to_string(),
            ));
        }
        Ok(())
    }

    async fn verify_pet_exists(&self, pet_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/pets?id=eq.{}", pet_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::PetNotFound);
        }

        Ok(())
    }

    async fn create_appointment_record(
        &self,
        request: &CompleteBookingRequest,
        slot: &Slot,
        owner_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let reference_number = generate_reference_number();

        let meeting_link = match request.appointment_type {
            AppointmentType::Video => Some(self.meeting.generate()),
            AppointmentType::InClinic => None,
        };

        let appointment_data = json!({
            "pet_id": request.pet_id,
            "owner_id": owner_id,
            "veterinarian_id": request.veterinarian_id,
            "slot_id": request.slot_id,
            "scheduled_time": slot.start_time.to_rfc3339(),
            "appointment_type": request.appointment_type.to_string(),
            "status": AppointmentStatus::Pending.to_string(),
            "reference_number": reference_number,
            "meeting_link": meeting_link,
            "notes": request.reason,
            "prescription": null,
            "reminder_24h_sent_at": null,
            "reminder_1h_sent_at": null,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
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
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError(
                "Failed to create appointment".to_string(),
            ));
        }

        let appointment: Appointment = serde_json::from_value(result[0].clone())
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;

        debug!(
            "Appointment {} created in PENDING with reference {}",
            appointment.id, appointment.reference_number
        );

        Ok(appointment)
    }
}

/// Human-shareable booking reference: date component plus a random suffix.
/// Collision-resistant, not globally ordered.
pub fn generate_reference_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("VB-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}
