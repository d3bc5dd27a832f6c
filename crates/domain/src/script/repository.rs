use super::ScriptVersion;
use crate::DomainError;
use async_trait::async_trait;

#[async_trait]
pub trait ScriptRepository: Send + Sync {
    async fn save(&self, script: &ScriptVersion) -> Result<(), DomainError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<ScriptVersion>, DomainError>;
    async fn find_active(&self, target_key: &str) -> Result<Option<ScriptVersion>, DomainError>;
    async fn find_all(&self) -> Result<Vec<ScriptVersion>, DomainError>;
}
