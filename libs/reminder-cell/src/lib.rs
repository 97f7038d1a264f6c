// libs/reminder-cell/src/lib.rs
pub mod models;
pub mod services;

pub use models::{SweepReport, SweeperConfig, SweeperError};
pub use services::sweeper::ReminderSweeperService;
