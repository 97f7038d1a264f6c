// libs/reminder-cell/src/services/mod.rs
pub mod sweeper;
