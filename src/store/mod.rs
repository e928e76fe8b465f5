//! Device store: authoritative state for devices, samples, alerts and commands
//!
//! The control-plane only talks to the [`DeviceStore`] trait. The in-memory
//! implementation keeps the whole system self-contained for tests and small
//! deployments; a database-backed implementation is a drop-in replacement.

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;

pub use backend::{AlertTransition, DeviceStore};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
