// libs/vet-cell/src/lib.rs
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{AppointmentType, Slot, SlotError, SlotReservation, SlotStatus, Vet, VetError};
pub use services::allocator::SlotAllocatorService;
pub use services::slots::SlotStoreService;
pub use services::vet::VetLookupService;
