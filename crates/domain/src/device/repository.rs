use super::{Device, DeviceId};
use crate::DomainError;
use async_trait::async_trait;

/// In-place mutation applied under the store's per-key lock.
pub type DeviceUpdate = Box<dyn FnOnce(&mut Device) + Send>;

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn save(&self, device: &Device) -> Result<(), DomainError>;
    async fn find_by_id(&self, id: &DeviceId) -> Result<Option<Device>, DomainError>;
    async fn find_all(&self) -> Result<Vec<Device>, DomainError>;
    /// Atomic per-key read-modify-write. Returns the updated record,
    /// or None if the device does not exist.
    async fn update(&self, id: &DeviceId, f: DeviceUpdate) -> Result<Option<Device>, DomainError>;
    async fn delete(&self, id: &DeviceId) -> Result<(), DomainError>;
}
