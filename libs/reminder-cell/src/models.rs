// libs/reminder-cell/src/models.rs
use serde::{Deserialize, Serialize};

/// Cadence and window settings for the background sweeps. Defaults are the
/// production values; tests shrink them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// How often the 24-hour reminder pass runs.
    pub reminder_24h_interval_secs: u64,
    /// How often the 1-hour reminder pass runs. Tighter than the 24h pass
    /// because the window it has to hit is much smaller.
    pub reminder_1h_interval_secs: u64,
    /// How often the no-show pass runs.
    pub no_show_interval_secs: u64,
    /// How often the daily-digest pass checks whether today's digest is due.
    pub digest_interval_secs: u64,
    /// Slack added to each reminder window so an appointment booked right at
    /// the lead-time boundary still gets swept up by the next pass.
    pub tolerance_minutes: i64,
    /// How long past its scheduled time a CONFIRMED appointment may sit
    /// before the sweep marks it NO_SHOW.
    pub no_show_grace_minutes: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            reminder_24h_interval_secs: 3600,
            reminder_1h_interval_secs: 900,
            no_show_interval_secs: 3600,
            digest_interval_secs: 3600,
            tolerance_minutes: 30,
            no_show_grace_minutes: 60,
        }
    }
}

/// Outcome of one sweep pass. Failures are counted, never fatal: one bad
/// appointment must not block the rest of the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub processed: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    #[error("Sweep query failed: {0}")]
    Query(String),

    #[error("Sweep pass already running")]
    AlreadyRunning,
}
