use super::ConfigTemplate;
use crate::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Replace the active template for its (scope, target) pair.
    async fn save_active(&self, template: &ConfigTemplate) -> Result<(), DomainError>;
    async fn find_active(&self, scope_key: &str) -> Result<Option<ConfigTemplate>, DomainError>;
    async fn find_all(&self) -> Result<Vec<ConfigTemplate>, DomainError>;
    async fn delete(&self, scope_key: &str) -> Result<(), DomainError>;
}
