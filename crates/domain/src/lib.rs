//! Domain layer - Pure business logic with no external dependencies
//!
//! This crate contains:
//! - Entities (Device, MasterInstance, ConfigTemplate, Command, ScriptVersion)
//! - Value Objects (DeviceId, DeviceStatus, ConfigScope)
//! - Repository interfaces (traits)
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Business rules enforced at domain level
//! - Rich domain models with behavior
//! - Testable in isolation

pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod master;
pub mod script;

// Re-export commonly used types
pub use command::{Command, CommandStatus};
pub use config::{ConfigScope, ConfigTemplate};
pub use device::{Device, DeviceId, DeviceStatus};
pub use error::DomainError;
pub use master::MasterInstance;
pub use script::{ScriptTarget, ScriptVersion};
