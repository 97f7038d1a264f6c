// libs/vet-cell/src/services/vet.rs
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Vet, VetError};

/// Read-only veterinarian lookup. The booking core never mutates vets.
pub struct VetLookupService {
    supabase: Arc<SupabaseClient>,
}

impl VetLookupService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_vet(&self, vet_id: Uuid, auth_token: &str) -> Result<Vet, VetError> {
        debug!("Fetching veterinarian: {}", vet_id);

        let path = format!("/rest/v1/veterinarians?id=eq.{}", vet_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| VetError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(VetError::NotFound);
        }

        let vet: Vet = serde_json::from_value(result[0].clone())
            .map_err(|e| VetError::DatabaseError(format!("Failed to parse veterinarian: {}", e)))?;

        if !vet.is_active {
            return Err(VetError::NotFound);
        }

        Ok(vet)
    }
}
