// libs/vet-cell/tests/allocator_test.rs
use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};
use vet_cell::models::SlotError;
use vet_cell::SlotAllocatorService;

fn allocator(server_uri: &str) -> SlotAllocatorService {
    SlotAllocatorService::new(&TestConfig::with_supabase_url(server_uri).to_app_config())
}

#[tokio::test]
async fn reserve_consumes_one_seat() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let vet_id = Uuid::new_v4().to_string();
    let start = Utc::now() + Duration::hours(24);

    Mock::given(method("GET"))
        .and(path("/rest/v1/vet_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&slot_id.to_string(), &vet_id, start, 3, 0)
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/vet_slots"))
        .and(query_param("booked_count", "eq.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&slot_id.to_string(), &vet_id, start, 3, 1)
        ])))
        .mount(&mock_server)
        .await;

    let reservation = allocator(&mock_server.uri())
        .reserve(slot_id, "token")
        .await
        .unwrap();

    assert_eq!(reservation.slot_id, slot_id);
    assert_eq!(reservation.seat_number, 1);
}

#[tokio::test]
async fn reserve_retries_after_losing_a_race() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let vet_id = Uuid::new_v4().to_string();
    let start = Utc::now() + Duration::hours(24);

    // First read observes booked_count 0, but the conditional PATCH matches
    // nothing because another caller got the seat in between.
    Mock::given(method("GET"))
        .and(path("/rest/v1/vet_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&slot_id.to_string(), &vet_id, start, 2, 0)
        ])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/vet_slots"))
        .and(query_param("booked_count", "eq.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // Retry sees the fresh count and wins the last seat.
    Mock::given(method("GET"))
        .and(path("/rest/v1/vet_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&slot_id.to_string(), &vet_id, start, 2, 1)
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/vet_slots"))
        .and(query_param("booked_count", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&slot_id.to_string(), &vet_id, start, 2, 2)
        ])))
        .mount(&mock_server)
        .await;

    let reservation = allocator(&mock_server.uri())
        .reserve(slot_id, "token")
        .await
        .unwrap();

    assert_eq!(reservation.seat_number, 2);
}

#[tokio::test]
async fn reserve_gives_up_after_repeated_contention() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let start = Utc::now() + Duration::hours(24);

    Mock::given(method("GET"))
        .and(path("/rest/v1/vet_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &Uuid::new_v4().to_string(),
                start,
                5,
                0
            )
        ])))
        .mount(&mock_server)
        .await;
    // Every CAS attempt loses.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/vet_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = allocator(&mock_server.uri()).reserve(slot_id, "token").await;
    assert_matches!(result, Err(SlotError::Contended));
}

#[tokio::test]
async fn reserve_rejects_full_slot_without_writing() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let start = Utc::now() + Duration::hours(24);

    Mock::given(method("GET"))
        .and(path("/rest/v1/vet_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &Uuid::new_v4().to_string(),
                start,
                1,
                1
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = allocator(&mock_server.uri()).reserve(slot_id, "token").await;
    assert_matches!(result, Err(SlotError::Full));
}

#[tokio::test]
async fn reserve_rejects_started_slot() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let started = Utc::now() - Duration::minutes(5);

    Mock::given(method("GET"))
        .and(path("/rest/v1/vet_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &Uuid::new_v4().to_string(),
                started,
                3,
                0
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = allocator(&mock_server.uri()).reserve(slot_id, "token").await;
    assert_matches!(result, Err(SlotError::Expired));
}

#[tokio::test]
async fn release_returns_one_seat() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let vet_id = Uuid::new_v4().to_string();
    let start = Utc::now() + Duration::hours(24);

    Mock::given(method("GET"))
        .and(path("/rest/v1/vet_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&slot_id.to_string(), &vet_id, start, 2, 1)
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/vet_slots"))
        .and(query_param("booked_count", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&slot_id.to_string(), &vet_id, start, 2, 0)
        ])))
        .mount(&mock_server)
        .await;

    let result = allocator(&mock_server.uri()).release(slot_id, "token").await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn release_is_a_no_op_at_zero() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let start = Utc::now() + Duration::hours(24);

    Mock::given(method("GET"))
        .and(path("/rest/v1/vet_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &slot_id.to_string(),
                &Uuid::new_v4().to_string(),
                start,
                2,
                0
            )
        ])))
        .mount(&mock_server)
        .await;

    // No PATCH mock: a write would fail the test with a wiremock 404, which
    // the allocator would surface as a database error.
    let result = allocator(&mock_server.uri()).release(slot_id, "token").await;
    assert!(result.is_ok());
}
