use crate::DomainError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A control-plane endpoint candidate that devices can be assigned to.
///
/// Lower `priority` wins; disabled instances are never selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterInstance {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub endpoint: String,
    pub priority: i32,
    pub enabled: bool,
    /// Advisory capacity hint surfaced to operators; not enforced.
    pub max_devices: Option<u32>,
}

impl MasterInstance {
    pub fn new(id: String, display_name: String, endpoint: String, priority: i32) -> Self {
        Self {
            id,
            display_name,
            description: String::new(),
            endpoint,
            priority,
            enabled: false,
            max_devices: None,
        }
    }
}

#[async_trait]
pub trait MasterRepository: Send + Sync {
    async fn save(&self, instance: &MasterInstance) -> Result<(), DomainError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<MasterInstance>, DomainError>;
    async fn find_all(&self) -> Result<Vec<MasterInstance>, DomainError>;
    async fn delete(&self, id: &str) -> Result<(), DomainError>;
}
