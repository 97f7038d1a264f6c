// libs/reminder-cell/src/services/sweeper.rs
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use booking_cell::models::{Actor, Appointment, AppointmentStatus};
use booking_cell::AppointmentLifecycleService;
use notification_cell::{NotificationDispatcher, NotificationKind};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{SweepReport, SweeperConfig, SweeperError};

/// Periodic background sweeps over the appointments table: 24-hour and 1-hour
/// reminders, no-show detection, and the per-vet daily digest.
///
/// Every pass is idempotent. The reminder passes use the sent-at marker
/// columns on the appointment row as their dedup guard, so a crash between
/// send and marker write means at worst one duplicate reminder, never a
/// missed one. Passes authenticate with the service-role key since they run
/// with no user in scope.
pub struct ReminderSweeperService {
    supabase: Arc<SupabaseClient>,
    lifecycle: AppointmentLifecycleService,
    notifications: Arc<NotificationDispatcher>,
    config: SweeperConfig,
    service_token: String,
    reminder_24h_guard: Mutex<()>,
    reminder_1h_guard: Mutex<()>,
    no_show_guard: Mutex<()>,
    last_digest_date: Mutex<Option<NaiveDate>>,
}

impl ReminderSweeperService {
    pub fn new(
        app_config: &AppConfig,
        config: SweeperConfig,
        notifications: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(app_config)),
            lifecycle: AppointmentLifecycleService::new(app_config, Arc::clone(&notifications)),
            notifications,
            config,
            service_token: app_config.supabase_service_role_key.clone(),
            reminder_24h_guard: Mutex::new(()),
            reminder_1h_guard: Mutex::new(()),
            no_show_guard: Mutex::new(()),
            last_digest_date: Mutex::new(None),
        }
    }

    /// Spawn the four sweep loops. Each loop ticks on its own cadence and
    /// logs pass outcomes; a failed pass waits for the next tick.
    pub fn spawn_loops(self: Arc<Self>) {
        info!(
            "Starting reminder sweeper (24h every {}s, 1h every {}s, no-show every {}s)",
            self.config.reminder_24h_interval_secs,
            self.config.reminder_1h_interval_secs,
            self.config.no_show_interval_secs
        );

        let sweeper = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(sweeper.config.reminder_24h_interval_secs));
            loop {
                ticker.tick().await;
                match sweeper.run_24h_reminder_pass().await {
                    Ok(report) => debug!("24h reminder pass: {:?}", report),
                    Err(e) => error!("24h reminder pass failed: {}", e),
                }
            }
        });

        let sweeper = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(sweeper.config.reminder_1h_interval_secs));
            loop {
                ticker.tick().await;
                match sweeper.run_1h_reminder_pass().await {
                    Ok(report) => debug!("1h reminder pass: {:?}", report),
                    Err(e) => error!("1h reminder pass failed: {}", e),
                }
            }
        });

        let sweeper = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(sweeper.config.no_show_interval_secs));
            loop {
                ticker.tick().await;
                match sweeper.run_no_show_pass().await {
                    Ok(report) => debug!("no-show pass: {:?}", report),
                    Err(e) => error!("no-show pass failed: {}", e),
                }
            }
        });

        let sweeper = self;
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(sweeper.config.digest_interval_secs));
            loop {
                ticker.tick().await;
                match sweeper.run_daily_digest_pass().await {
                    Ok(report) => debug!("daily digest pass: {:?}", report),
                    Err(e) => error!("daily digest pass failed: {}", e),
                }
            }
        });
    }

    /// Appointments starting within the next 24 hours that have not had their
    /// 24h reminder yet.
    pub async fn run_24h_reminder_pass(&self) -> Result<SweepReport, SweeperError> {
        let _guard = self
            .reminder_24h_guard
            .try_lock()
            .map_err(|_| SweeperError::AlreadyRunning)?;

        let now = Utc::now();
        let upper = now
            + ChronoDuration::hours(24)
            + ChronoDuration::minutes(self.config.tolerance_minutes);
        self.run_reminder_pass(
            now,
            upper,
            "reminder_24h_sent_at",
            NotificationKind::Reminder24h,
        )
        .await
    }

    /// Appointments starting within the next hour that have not had their
    /// 1h reminder yet.
    pub async fn run_1h_reminder_pass(&self) -> Result<SweepReport, SweeperError> {
        let _guard = self
            .reminder_1h_guard
            .try_lock()
            .map_err(|_| SweeperError::AlreadyRunning)?;

        let now = Utc::now();
        let upper = now
            + ChronoDuration::hours(1)
            + ChronoDuration::minutes(self.config.tolerance_minutes);
        self.run_reminder_pass(
            now,
            upper,
            "reminder_1h_sent_at",
            NotificationKind::Reminder1h,
        )
        .await
    }

    async fn run_reminder_pass(
        &self,
        lower: DateTime<Utc>,
        upper: DateTime<Utc>,
        marker_column: &str,
        kind: NotificationKind,
    ) -> Result<SweepReport, SweeperError> {
        let path = format!(
            "/rest/v1/appointments?status=eq.confirmed&{}=is.null&scheduled_time=gte.{}&scheduled_time=lte.{}",
            marker_column,
            urlencoding::encode(&lower.to_rfc3339()),
            urlencoding::encode(&upper.to_rfc3339())
        );

        let appointments = self.fetch_appointments(&path).await?;
        let mut report = SweepReport {
            examined: appointments.len(),
            ..SweepReport::default()
        };

        for appointment in appointments {
            let payload = json!({
                "appointment_id": appointment.id,
                "reference_number": appointment.reference_number,
                "scheduled_time": appointment.scheduled_time.to_rfc3339(),
                "meeting_link": appointment.meeting_link
            });
            self.notifications.send(appointment.owner_id, kind, payload);

            // Marker write after the enqueue: a duplicate reminder beats a
            // silently lost one.
            match self.mark_reminder_sent(appointment.id, marker_column).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!(
                        "Failed to mark {} on appointment {}: {}",
                        marker_column, appointment.id, e
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// CONFIRMED appointments whose start time is more than the grace period
    /// in the past get marked NO_SHOW. Slot capacity is not released; the
    /// seat was held and wasted.
    pub async fn run_no_show_pass(&self) -> Result<SweepReport, SweeperError> {
        let _guard = self
            .no_show_guard
            .try_lock()
            .map_err(|_| SweeperError::AlreadyRunning)?;

        let cutoff = Utc::now() - ChronoDuration::minutes(self.config.no_show_grace_minutes);
        let path = format!(
            "/rest/v1/appointments?status=eq.confirmed&scheduled_time=lte.{}",
            urlencoding::encode(&cutoff.to_rfc3339())
        );

        let appointments = self.fetch_appointments(&path).await?;
        let mut report = SweepReport {
            examined: appointments.len(),
            ..SweepReport::default()
        };

        for appointment in appointments {
            match self
                .lifecycle
                .apply_transition(
                    appointment.id,
                    AppointmentStatus::NoShow,
                    Actor::system(),
                    Some("no-show sweep: appointment start time elapsed".to_string()),
                    None,
                    None,
                    &self.service_token,
                )
                .await
            {
                Ok(_) => {
                    info!("Appointment {} marked NO_SHOW", appointment.id);
                    report.processed += 1;
                }
                Err(e) => {
                    // Likely lost a race with a concurrent completion or
                    // cancellation; the next pass will not see it again.
                    warn!("No-show transition failed for appointment {}: {}", appointment.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// One digest per vet per UTC day, summarising that day's active
    /// appointments. Runs at most once per day regardless of tick cadence.
    pub async fn run_daily_digest_pass(&self) -> Result<SweepReport, SweeperError> {
        let today = Utc::now().date_naive();
        if *self.last_digest_date.lock().await == Some(today) {
            return Ok(SweepReport::default());
        }

        let start = today
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        let end = start + ChronoDuration::days(1);

        let path = format!(
            "/rest/v1/appointments?status=in.(pending,confirmed)&scheduled_time=gte.{}&scheduled_time=lt.{}&order=scheduled_time.asc",
            urlencoding::encode(&start.to_rfc3339()),
            urlencoding::encode(&end.to_rfc3339())
        );

        let appointments = self.fetch_appointments(&path).await?;
        let mut report = SweepReport {
            examined: appointments.len(),
            ..SweepReport::default()
        };

        let mut by_vet: std::collections::HashMap<Uuid, Vec<&Appointment>> =
            std::collections::HashMap::new();
        for appointment in &appointments {
            by_vet
                .entry(appointment.veterinarian_id)
                .or_default()
                .push(appointment);
        }

        for (vet_id, day_appointments) in by_vet {
            let entries: Vec<Value> = day_appointments
                .iter()
                .map(|a| {
                    json!({
                        "appointment_id": a.id,
                        "reference_number": a.reference_number,
                        "scheduled_time": a.scheduled_time.to_rfc3339(),
                        "appointment_type": a.appointment_type.to_string(),
                        "status": a.status.to_string()
                    })
                })
                .collect();

            let count = entries.len();
            self.notifications.send(
                vet_id,
                NotificationKind::VetDailyDigest,
                json!({ "date": today.to_string(), "appointment_count": count, "appointments": entries }),
            );
            report.processed += 1;
        }

        // Marked done only once the pass succeeded; a failed fetch leaves the
        // day open for the next tick.
        *self.last_digest_date.lock().await = Some(today);

        Ok(report)
    }

    async fn fetch_appointments(&self, path: &str) -> Result<Vec<Appointment>, SweeperError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(&self.service_token), None)
            .await
            .map_err(|e| SweeperError::Query(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| SweeperError::Query(format!("Failed to parse appointments: {}", e)))
    }

    async fn mark_reminder_sent(
        &self,
        appointment_id: Uuid,
        marker_column: &str,
    ) -> Result<(), SweeperError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut update = serde_json::Map::new();
        update.insert(marker_column.to_string(), json!(Utc::now().to_rfc3339()));
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        let update = Value::Object(update);

        let _: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(&self.service_token), Some(update))
            .await
            .map_err(|e| SweeperError::Query(e.to_string()))?;

        Ok(())
    }
}
