// libs/vet-cell/src/services/mod.rs
pub mod allocator;
pub mod slots;
pub mod vet;
