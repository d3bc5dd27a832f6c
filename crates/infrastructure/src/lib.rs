//! Infrastructure layer - concrete stores behind the domain repository traits
//!
//! Two interchangeable backends:
//! - `memory`: DashMap-backed, per-key atomicity via shard entry locks
//! - `sqlite`: single-writer sqlx pool, schema bootstrapped on open

pub mod memory;
pub mod sqlite;

pub use memory::{
    InMemoryCommandRepository, InMemoryConfigRepository, InMemoryDeviceRepository,
    InMemoryMasterRepository, InMemoryScriptRepository,
};
pub use sqlite::SqliteFleetStore;
