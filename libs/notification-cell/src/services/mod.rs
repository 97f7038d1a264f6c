// libs/notification-cell/src/services/mod.rs
pub mod dispatcher;
