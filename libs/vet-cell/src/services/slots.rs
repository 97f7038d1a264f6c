// libs/vet-cell/src/services/slots.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AppointmentType, CreateSlotRequest, OpenSlotsQuery, Slot, SlotError, SlotStatus,
};

/// Persistence for availability windows. Creation and cancellation live here;
/// the capacity pair (`booked_count`/`status`) is mutated only by the allocator.
pub struct SlotStoreService {
    supabase: Arc<SupabaseClient>,
}

impl SlotStoreService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Publish an availability window for a veterinarian.
    pub async fn create_slot(
        &self,
        vet_id: Uuid,
        request: CreateSlotRequest,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        debug!("Creating slot for veterinarian {}", vet_id);

        if request.start_time >= request.end_time {
            return Err(SlotError::Invalid(
                "Start time must be before end time".to_string(),
            ));
        }
        if request.start_time <= Utc::now() {
            return Err(SlotError::Invalid(
                "Slot must start in the future".to_string(),
            ));
        }
        if request.capacity < 1 {
            return Err(SlotError::Invalid(
                "Capacity must be at least 1".to_string(),
            ));
        }

        let now = Utc::now();
        let slot_data = json!({
            "veterinarian_id": vet_id,
            "start_time": request.start_time.to_rfc3339(),
            "end_time": request.end_time.to_rfc3339(),
            "capacity": request.capacity,
            "booked_count": 0,
            "status": SlotStatus::Available.to_string(),
            "supported_mode": request.supported_mode.to_string(),
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
                "/rest/v1/vet_slots",
                Some(auth_token),
                Some(slot_data),
                Some(headers),
            )
            .await
            .map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(SlotError::DatabaseError(
                "Failed to create slot".to_string(),
            ));
        }

        let slot: Slot = serde_json::from_value(result[0].clone())
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse slot: {}", e)))?;

        info!("Slot {} published for veterinarian {}", slot.id, vet_id);
        Ok(slot)
    }

    pub async fn get_slot(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, SlotError> {
        let path = format!("/rest/v1/vet_slots?id=eq.{}", slot_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(SlotError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse slot: {}", e)))
    }

    /// Owner-facing browse of open, future windows.
    pub async fn list_open_slots(
        &self,
        query: OpenSlotsQuery,
        auth_token: &str,
    ) -> Result<Vec<Slot>, SlotError> {
        let mut query_parts = vec![
            format!("status=eq.{}", SlotStatus::Available),
        ];

        let from = query.from.unwrap_or_else(Utc::now);
        let encoded_from = urlencoding::encode(&from.to_rfc3339()).into_owned();
        query_parts.push(format!("start_time=gte.{}", encoded_from));

        if let Some(to) = query.to {
            let encoded_to = urlencoding::encode(&to.to_rfc3339()).into_owned();
            query_parts.push(format!("start_time=lte.{}", encoded_to));
        }
        if let Some(vet_id) = query.veterinarian_id {
            query_parts.push(format!("veterinarian_id=eq.{}", vet_id));
        }

        let path = format!(
            "/rest/v1/vet_slots?{}&order=start_time.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        let mut slots: Vec<Slot> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Slot>, _>>()
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse slots: {}", e)))?;

        if let Some(appointment_type) = query.appointment_type {
            slots.retain(|slot| slot.supports(appointment_type));
        }

        Ok(slots)
    }

    /// Advisory validation used by the booking protocol's second step. The
    /// authoritative check is the allocator's compare-and-swap at commit time.
    pub async fn validate_slot(
        &self,
        slot_id: Uuid,
        appointment_type: AppointmentType,
        auth_token: &str,
    ) -> Result<Slot, SlotError> {
        let slot = self.get_slot(slot_id, auth_token).await?;

        match slot.status {
            SlotStatus::Cancelled => return Err(SlotError::Cancelled),
            SlotStatus::Booked => return Err(SlotError::Full),
            SlotStatus::Available => {}
        }
        if slot.has_started(Utc::now()) {
            return Err(SlotError::Expired);
        }
        if slot.is_full() {
            return Err(SlotError::Full);
        }
        if !slot.supports(appointment_type) {
            return Err(SlotError::TypeMismatch {
                requested: appointment_type,
            });
        }

        Ok(slot)
    }

    /// Withdraw a window. Appointments already referencing the slot are left
    /// untouched; the slot row itself is never deleted.
    pub async fn cancel_slot(&self, slot_id: Uuid, auth_token: &str) -> Result<Slot, SlotError> {
        debug!("Cancelling slot {}", slot_id);

        let path = format!("/rest/v1/vet_slots?id=eq.{}", slot_id);
        let update = json!({
            "status": SlotStatus::Cancelled.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update), Some(headers))
            .await
            .map_err(|e| SlotError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(SlotError::NotFound);
        }

        let slot: Slot = serde_json::from_value(result[0].clone())
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse slot: {}", e)))?;

        info!("Slot {} cancelled", slot_id);
        Ok(slot)
    }
}
