use super::{Command, CommandStatus};
use crate::DomainError;
use crate::device::DeviceId;
use async_trait::async_trait;

/// In-place mutation applied under the store's per-key lock.
pub type CommandUpdate = Box<dyn FnOnce(&mut Command) + Send>;

#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn save(&self, command: &Command) -> Result<(), DomainError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Command>, DomainError>;
    /// Pending commands for one device, unordered; the queue service applies
    /// the (priority, created_at) ordering.
    async fn find_pending(&self, device_id: &DeviceId) -> Result<Vec<Command>, DomainError>;
    async fn find_filtered(
        &self,
        device_id: Option<&DeviceId>,
        status: Option<CommandStatus>,
    ) -> Result<Vec<Command>, DomainError>;
    /// Atomic per-key read-modify-write. Returns the updated record,
    /// or None if the command does not exist.
    async fn update(&self, id: &str, f: CommandUpdate) -> Result<Option<Command>, DomainError>;
}
