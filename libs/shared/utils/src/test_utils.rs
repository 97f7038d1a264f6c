use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            meeting_link_base_url: "https://meet.test.vetbook.app".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "owner".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn owner(email: &str) -> Self {
        Self::new(email, "owner")
    }

    pub fn vet(email: &str) -> Self {
        Self::new(email, "vet")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn auth_header_value(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_test_token(user, secret, None))
    }
}

/// Canned PostgREST rows for wiremock-backed tests.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn vet_response(vet_id: &str, full_name: &str, clinic_name: &str) -> Value {
        json!({
            "id": vet_id,
            "full_name": full_name,
            "clinic_name": clinic_name,
            "email": "vet@example.com",
            "is_active": true,
            "created_at": Utc::now().to_rfc3339()
        })
    }

    pub fn pet_response(pet_id: &str, owner_id: &str, name: &str) -> Value {
        json!({
            "id": pet_id,
            "owner_id": owner_id,
            "name": name,
            "species": "dog",
            "created_at": Utc::now().to_rfc3339()
        })
    }

    pub fn slot_response(
        slot_id: &str,
        vet_id: &str,
        start_time: DateTime<Utc>,
        capacity: i32,
        booked_count: i32,
    ) -> Value {
        let status = if booked_count >= capacity { "booked" } else { "available" };
        json!({
            "id": slot_id,
            "veterinarian_id": vet_id,
            "start_time": start_time.to_rfc3339(),
            "end_time": (start_time + Duration::minutes(30)).to_rfc3339(),
            "capacity": capacity,
            "booked_count": booked_count,
            "status": status,
            "supported_mode": "both",
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn appointment_response(
        appointment_id: &str,
        pet_id: &str,
        owner_id: &str,
        vet_id: &str,
        slot_id: &str,
        scheduled_time: DateTime<Utc>,
        status: &str,
    ) -> Value {
        json!({
            "id": appointment_id,
            "pet_id": pet_id,
            "owner_id": owner_id,
            "veterinarian_id": vet_id,
            "slot_id": slot_id,
            "scheduled_time": scheduled_time.to_rfc3339(),
            "appointment_type": "video",
            "status": status,
            "reference_number": "VB-20260830-A1B2C3",
            "meeting_link": "https://meet.test.vetbook.app/room/test",
            "notes": null,
            "prescription": null,
            "reminder_24h_sent_at": null,
            "reminder_1h_sent_at": null,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        })
    }

    pub fn history_response(appointment_id: &str, from: Option<&str>, to: &str) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "appointment_id": appointment_id,
            "from_status": from,
            "to_status": to,
            "reason": "test",
            "changed_by": Uuid::new_v4().to_string(),
            "changed_by_role": "system",
            "created_at": Utc::now().to_rfc3339()
        })
    }
}
