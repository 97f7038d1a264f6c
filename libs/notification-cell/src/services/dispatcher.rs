// libs/notification-cell/src/services/dispatcher.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    DeliveryRecord, DeliveryState, DispatcherConfig, NotificationKind, NotificationRequest,
};

/// Transport seam. Real delivery (email/SMS/push) lives behind this trait;
/// the shipped implementation only logs.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(&self, request: &NotificationRequest) -> anyhow::Result<()>;
}

pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn deliver(&self, request: &NotificationRequest) -> anyhow::Result<()> {
        info!(
            "Delivering {} notification {} to user {}",
            request.kind, request.id, request.recipient_id
        );
        Ok(())
    }
}

/// Fire-and-forget notification dispatcher.
///
/// `send` enqueues and returns immediately; a background worker drives the
/// channel with bounded retries. Delivery failures never reach the caller and
/// never roll back booking state - exhausted requests are recorded and exposed
/// through [`NotificationDispatcher::failed_deliveries`].
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<NotificationRequest>,
    failed: Arc<RwLock<Vec<DeliveryRecord>>>,
}

impl NotificationDispatcher {
    pub fn start(channel: Arc<dyn NotificationChannel>, config: DispatcherConfig) -> Arc<Self> {
        Self::start_with_persistence(channel, config, None)
    }

    /// Start with best-effort bookkeeping into the `notification_log` table.
    pub fn start_persisted(
        channel: Arc<dyn NotificationChannel>,
        config: DispatcherConfig,
        app_config: &AppConfig,
    ) -> Arc<Self> {
        let persistence = if app_config.supabase_service_role_key.is_empty() {
            None
        } else {
            Some((
                Arc::new(SupabaseClient::new(app_config)),
                app_config.supabase_service_role_key.clone(),
            ))
        };
        Self::start_with_persistence(channel, config, persistence)
    }

    fn start_with_persistence(
        channel: Arc<dyn NotificationChannel>,
        config: DispatcherConfig,
        persistence: Option<(Arc<SupabaseClient>, String)>,
    ) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<NotificationRequest>();
        let failed = Arc::new(RwLock::new(Vec::new()));

        let worker_failed = Arc::clone(&failed);
        tokio::spawn(async move {
            debug!("Notification delivery worker started");
            while let Some(request) = rx.recv().await {
                let record = deliver_with_retries(channel.as_ref(), &request, &config).await;

                if record.state == DeliveryState::Failed {
                    warn!(
                        "Notification {} to user {} failed after {} attempts: {:?}",
                        request.id, request.recipient_id, record.attempts, record.last_error
                    );
                    worker_failed.write().await.push(record.clone());
                }

                if let Some((supabase, token)) = &persistence {
                    persist_record(supabase, token, &record).await;
                }
            }
            debug!("Notification delivery worker stopped");
        });

        Arc::new(Self { tx, failed })
    }

    /// Enqueue a notification. Never blocks and never fails the caller; a
    /// closed worker is logged and dropped.
    pub fn send(&self, recipient_id: Uuid, kind: NotificationKind, payload: Value) {
        let request = NotificationRequest {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            payload,
            enqueued_at: Utc::now(),
        };

        debug!(
            "Enqueuing {} notification {} for user {}",
            kind, request.id, recipient_id
        );

        if self.tx.send(request).is_err() {
            error!("Notification worker is gone, dropping {} notification", kind);
        }
    }

    /// Operational listing of deliveries that exhausted their retries.
    pub async fn failed_deliveries(&self) -> Vec<DeliveryRecord> {
        self.failed.read().await.clone()
    }
}

async fn deliver_with_retries(
    channel: &dyn NotificationChannel,
    request: &NotificationRequest,
    config: &DispatcherConfig,
) -> DeliveryRecord {
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match channel.deliver(request).await {
            Ok(()) => {
                return DeliveryRecord {
                    request: request.clone(),
                    attempts: attempt,
                    state: DeliveryState::Delivered,
                    last_error: None,
                    completed_at: Utc::now(),
                };
            }
            Err(e) => {
                debug!(
                    "Delivery attempt {}/{} for notification {} failed: {}",
                    attempt, config.max_attempts, request.id, e
                );
                last_error = Some(e.to_string());
                if attempt < config.max_attempts {
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        config.retry_backoff_ms * attempt as u64,
                    ))
                    .await;
                }
            }
        }
    }

    DeliveryRecord {
        request: request.clone(),
        attempts: config.max_attempts,
        state: DeliveryState::Failed,
        last_error,
        completed_at: Utc::now(),
    }
}

async fn persist_record(supabase: &SupabaseClient, token: &str, record: &DeliveryRecord) {
    let row = json!({
        "notification_id": record.request.id,
        "recipient_id": record.request.recipient_id,
        "kind": record.request.kind.to_string(),
        "attempts": record.attempts,
        "state": record.state,
        "last_error": record.last_error,
        "enqueued_at": record.request.enqueued_at.to_rfc3339(),
        "completed_at": record.completed_at.to_rfc3339()
    });

    if let Err(e) = supabase
        .request::<Vec<Value>>(Method::POST, "/rest/v1/notification_log", Some(token), Some(row))
        .await
    {
        // Bookkeeping is best effort; the in-memory listing still has it.
        warn!("Failed to persist notification log row: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyChannel {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl NotificationChannel for FlakyChannel {
        async fn deliver(&self, _request: &NotificationRequest) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                anyhow::bail!("transport unavailable");
            }
            Ok(())
        }
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            max_attempts: 3,
            retry_backoff_ms: 1,
        }
    }

    fn request() -> NotificationRequest {
        NotificationRequest {
            id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            kind: NotificationKind::BookingConfirmed,
            payload: json!({"reference_number": "VB-20260830-A1B2C3"}),
            enqueued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_on_first_attempt() {
        let channel = FlakyChannel { failures_before_success: 0, calls: AtomicU32::new(0) };
        let record = deliver_with_retries(&channel, &request(), &fast_config()).await;

        assert_eq!(record.state, DeliveryState::Delivered);
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let channel = FlakyChannel { failures_before_success: 2, calls: AtomicU32::new(0) };
        let record = deliver_with_retries(&channel, &request(), &fast_config()).await;

        assert_eq!(record.state, DeliveryState::Delivered);
        assert_eq!(record.attempts, 3);
    }

    #[tokio::test]
    async fn marks_failed_after_exhausting_attempts() {
        let channel = FlakyChannel { failures_before_success: 10, calls: AtomicU32::new(0) };
        let record = deliver_with_retries(&channel, &request(), &fast_config()).await;

        assert_eq!(record.state, DeliveryState::Failed);
        assert_eq!(record.attempts, 3);
        assert!(record.last_error.is_some());
    }

    #[tokio::test]
    async fn failed_delivery_shows_up_in_listing() {
        let channel = Arc::new(FlakyChannel { failures_before_success: 10, calls: AtomicU32::new(0) });
        let dispatcher = NotificationDispatcher::start(channel, fast_config());

        dispatcher.send(Uuid::new_v4(), NotificationKind::Reminder24h, json!({}));

        // Give the worker time to exhaust its retries.
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let failed = dispatcher.failed_deliveries().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].request.kind, NotificationKind::Reminder24h);
    }

    #[tokio::test]
    async fn send_never_blocks_on_successful_path() {
        let channel = Arc::new(FlakyChannel { failures_before_success: 0, calls: AtomicU32::new(0) });
        let dispatcher = NotificationDispatcher::start(channel, fast_config());

        for _ in 0..50 {
            dispatcher.send(Uuid::new_v4(), NotificationKind::BookingAlert, json!({}));
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        assert!(dispatcher.failed_deliveries().await.is_empty());
    }
}
