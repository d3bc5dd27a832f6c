mod entity;
mod repository;

pub use entity::{Command, CommandStatus};
pub use repository::{CommandRepository, CommandUpdate};
