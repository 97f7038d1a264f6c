// libs/reminder-cell/tests/sweeper_test.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::{
    DispatcherConfig, NotificationChannel, NotificationDispatcher, NotificationKind,
    NotificationRequest,
};
use reminder_cell::{ReminderSweeperService, SweeperConfig};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

struct RecordingChannel {
    delivered: Arc<Mutex<Vec<NotificationRequest>>>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn deliver(&self, request: &NotificationRequest) -> anyhow::Result<()> {
        self.delivered.lock().await.push(request.clone());
        Ok(())
    }
}

fn sweeper_with_recorder(
    server_uri: &str,
) -> (Arc<ReminderSweeperService>, Arc<Mutex<Vec<NotificationRequest>>>) {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let channel = Arc::new(RecordingChannel {
        delivered: Arc::clone(&delivered),
    });
    let dispatcher = NotificationDispatcher::start(
        channel,
        DispatcherConfig {
            max_attempts: 1,
            retry_backoff_ms: 1,
        },
    );
    let config = TestConfig::with_supabase_url(server_uri).to_app_config();
    let sweeper = Arc::new(ReminderSweeperService::new(
        &config,
        SweeperConfig::default(),
        dispatcher,
    ));
    (sweeper, delivered)
}

async fn drain_dispatcher() {
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
}

#[tokio::test]
async fn reminder_pass_sends_and_marks_due_appointments() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4().to_string();
    let owner_id = Uuid::new_v4();

    let due = MockSupabaseResponses::appointment_response(
        &appointment_id,
        &Uuid::new_v4().to_string(),
        &owner_id.to_string(),
        &Uuid::new_v4().to_string(),
        &Uuid::new_v4().to_string(),
        Utc::now() + Duration::hours(23),
        "confirmed",
    );

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([due])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let (sweeper, delivered) = sweeper_with_recorder(&mock_server.uri());

    let report = sweeper.run_24h_reminder_pass().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);

    drain_dispatcher().await;
    let delivered = delivered.lock().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].kind, NotificationKind::Reminder24h);
    assert_eq!(delivered[0].recipient_id, owner_id);
}

#[tokio::test]
async fn reminder_pass_with_nothing_due_sends_nothing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let (sweeper, delivered) = sweeper_with_recorder(&mock_server.uri());

    let report = sweeper.run_1h_reminder_pass().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(report.processed, 0);

    drain_dispatcher().await;
    assert!(delivered.lock().await.is_empty());
}

#[tokio::test]
async fn no_show_pass_transitions_overdue_confirmed_appointments() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4().to_string();
    let owner_id = Uuid::new_v4().to_string();
    let vet_id = Uuid::new_v4().to_string();
    let pet_id = Uuid::new_v4().to_string();
    let slot_id = Uuid::new_v4().to_string();
    let started = Utc::now() - Duration::hours(2);

    let overdue = MockSupabaseResponses::appointment_response(
        &appointment_id,
        &pet_id,
        &owner_id,
        &vet_id,
        &slot_id,
        started,
        "confirmed",
    );
    let mut transitioned = overdue.clone();
    transitioned["status"] = json!("no_show");

    // Lookup by id during the transition; must be registered before the
    // broader listing mock.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([overdue.clone()])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.confirmed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([overdue])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([transitioned])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointment_history"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::history_response(&appointment_id, Some("confirmed"), "no_show")
        ])))
        .mount(&mock_server)
        .await;

    let (sweeper, delivered) = sweeper_with_recorder(&mock_server.uri());

    let report = sweeper.run_no_show_pass().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);

    // A no-show is not a cancellation: nobody gets notified and the seat
    // stays consumed.
    drain_dispatcher().await;
    assert!(delivered.lock().await.is_empty());
}

#[tokio::test]
async fn reminder_passes_do_not_block_each_other() {
    let mock_server = MockServer::start().await;

    // Slow responses keep the 24h pass in flight while the 1h pass runs.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(tokio::time::Duration::from_millis(300)),
        )
        .mount(&mock_server)
        .await;

    let (sweeper, _delivered) = sweeper_with_recorder(&mock_server.uri());

    let slow = Arc::clone(&sweeper);
    let long_pass = tokio::spawn(async move { slow.run_24h_reminder_pass().await });
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    let report = sweeper.run_1h_reminder_pass().await.unwrap();
    assert_eq!(report.examined, 0);

    assert!(long_pass.await.unwrap().is_ok());
}

#[tokio::test]
async fn digest_day_stays_open_after_a_failed_pass() {
    let mock_server = MockServer::start().await;
    let vet_id = Uuid::new_v4();

    // First fetch fails transiently; the day must not be marked done.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "unavailable"})))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &vet_id.to_string(),
                &Uuid::new_v4().to_string(),
                Utc::now() + Duration::hours(2),
                "confirmed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let (sweeper, delivered) = sweeper_with_recorder(&mock_server.uri());

    assert!(sweeper.run_daily_digest_pass().await.is_err());

    let report = sweeper.run_daily_digest_pass().await.unwrap();
    assert_eq!(report.processed, 1);

    drain_dispatcher().await;
    let delivered = delivered.lock().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].recipient_id, vet_id);
}

#[tokio::test]
async fn daily_digest_groups_by_vet_and_runs_once_per_day() {
    let mock_server = MockServer::start().await;
    let vet_a = Uuid::new_v4();
    let vet_b = Uuid::new_v4();

    let rows: Vec<serde_json::Value> = [
        (vet_a, Utc::now() + Duration::hours(1)),
        (vet_a, Utc::now() + Duration::hours(3)),
        (vet_b, Utc::now() + Duration::hours(5)),
    ]
    .iter()
    .map(|(vet, when)| {
        MockSupabaseResponses::appointment_response(
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            &vet.to_string(),
            &Uuid::new_v4().to_string(),
            *when,
            "confirmed",
        )
    })
    .collect();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
        .mount(&mock_server)
        .await;

    let (sweeper, delivered) = sweeper_with_recorder(&mock_server.uri());

    let report = sweeper.run_daily_digest_pass().await.unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.processed, 2);

    drain_dispatcher().await;
    {
        let delivered = delivered.lock().await;
        assert_eq!(delivered.len(), 2);
        assert!(delivered
            .iter()
            .all(|r| r.kind == NotificationKind::VetDailyDigest));
        let digest_for_a = delivered
            .iter()
            .find(|r| r.recipient_id == vet_a)
            .unwrap();
        assert_eq!(digest_for_a.payload["appointment_count"], json!(2));
    }

    // Second run on the same day is a no-op.
    let report = sweeper.run_daily_digest_pass().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(report.processed, 0);
}
