// libs/vet-cell/src/services/allocator.rs
//
// Single contention point of the booking core: every reservation and every
// release funnels through the compare-and-swap loop below. The CAS is a
// PostgREST conditional PATCH filtered on the observed booked_count, so it is
// safe across horizontally scaled instances - no process-local locking.
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Slot, SlotError, SlotReservation, SlotStatus};
use crate::services::slots::SlotStoreService;

const MAX_CAS_ATTEMPTS: u32 = 3;
const CAS_BACKOFF_MS: u64 = 50;

pub struct SlotAllocatorService {
    supabase: Arc<SupabaseClient>,
    store: SlotStoreService,
    max_attempts: u32,
}

impl SlotAllocatorService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            store: SlotStoreService::with_client(Arc::clone(&supabase)),
            supabase,
            max_attempts: MAX_CAS_ATTEMPTS,
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            store: SlotStoreService::with_client(Arc::clone(&supabase)),
            supabase,
            max_attempts: MAX_CAS_ATTEMPTS,
        }
    }

    /// Atomically consume one unit of the slot's capacity.
    ///
    /// Serialized against concurrent reserves and releases on the same slot by
    /// the booked_count filter: a stale read makes the PATCH match zero rows,
    /// and the attempt is retried against fresh state. The sum of successful
    /// reservations can therefore never exceed `capacity`.
    pub async fn reserve(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<SlotReservation, SlotError> {
        for attempt in 1..=self.max_attempts {
            let slot = self.store.get_slot(slot_id, auth_token).await?;

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

            let new_count = slot.booked_count + 1;
            let new_status = if new_count >= slot.capacity {
                SlotStatus::Booked
            } else {
                SlotStatus::Available
            };

            match self
                .compare_and_swap(&slot, new_count, new_status, auth_token)
                .await?
            {
                Some(_) => {
                    info!(
                        "Reserved seat {}/{} on slot {}",
                        new_count, slot.capacity, slot_id
                    );
                    return Ok(SlotReservation {
                        slot_id,
                        seat_number: new_count,
                        reserved_at: Utc::now(),
                    });
                }
                None => {
                    warn!(
                        "Slot {} reservation raced (attempt {}/{})",
                        slot_id, attempt, self.max_attempts
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        CAS_BACKOFF_MS * attempt as u64,
                    ))
                    .await;
                }
            }
        }

        Err(SlotError::Contended)
    }

    /// Return one unit of capacity, floored at zero. A cancelled slot keeps its
    /// cancelled status; otherwise freeing a seat flips the slot back to
    /// available.
    pub async fn release(&self, slot_id: Uuid, auth_token: &str) -> Result<(), SlotError> {
        for attempt in 1..=self.max_attempts {
            let slot = self.store.get_slot(slot_id, auth_token).await?;

            if slot.booked_count <= 0 {
                debug!("Slot {} already at zero booked_count, nothing to release", slot_id);
                return Ok(());
            }

            let new_count = slot.booked_count - 1;
            let new_status = if slot.status == SlotStatus::Cancelled {
                SlotStatus::Cancelled
            } else {
                SlotStatus::Available
            };

            match self
                .compare_and_swap(&slot, new_count, new_status, auth_token)
                .await?
            {
                Some(_) => {
                    info!(
                        "Released one seat on slot {} ({} remaining booked)",
                        slot_id, new_count
                    );
                    return Ok(());
                }
                None => {
                    warn!(
                        "Slot {} release raced (attempt {}/{})",
                        slot_id, attempt, self.max_attempts
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        CAS_BACKOFF_MS * attempt as u64,
                    ))
                    .await;
                }
            }
        }

        Err(SlotError::Contended)
    }

    /// Conditional PATCH keyed on the observed booked_count. Returns the
    /// updated row on success and `None` when another writer got there first.
    async fn compare_and_swap(
        &self,
        observed: &Slot,
        new_count: i32,
        new_status: SlotStatus,
        auth_token: &str,
    ) -> Result<Option<Slot>, SlotError> {
        let path = format!(
            "/rest/v1/vet_slots?id=eq.{}&booked_count=eq.{}&status=eq.{}",
            observed.id, observed.booked_count, observed.status
        );
        let update = json!({
            "booked_count": new_count,
            "status": new_status.to_string(),
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
            return Ok(None);
        }

        let slot: Slot = serde_json::from_value(result[0].clone())
            .map_err(|e| SlotError::DatabaseError(format!("Failed to parse slot: {}", e)))?;

        Ok(Some(slot))
    }
}
