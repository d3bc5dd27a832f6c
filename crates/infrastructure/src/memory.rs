//! In-memory repositories backed by `DashMap`.
//!
//! Writers touch only the keys implicated by the current request; the map's
//! shard entry locks serialize concurrent mutation of the same key, which is
//! exactly the per-device serialization the services rely on.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use domain::DomainError;
use domain::command::{Command, CommandRepository, CommandStatus, CommandUpdate};
use domain::config::{ConfigRepository, ConfigTemplate};
use domain::device::{Device, DeviceId, DeviceRepository, DeviceUpdate};
use domain::master::{MasterInstance, MasterRepository};
use domain::script::{ScriptRepository, ScriptVersion};

#[derive(Clone, Default)]
pub struct InMemoryDeviceRepository {
    devices: Arc<DashMap<String, Device>>,
}

impl InMemoryDeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    async fn save(&self, device: &Device) -> Result<(), DomainError> {
        self.devices.insert(device.id.to_string(), device.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &DeviceId) -> Result<Option<Device>, DomainError> {
        Ok(self.devices.get(id.as_str()).map(|e| e.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<Device>, DomainError> {
        Ok(self.devices.iter().map(|e| e.value().clone()).collect())
    }

    async fn update(&self, id: &DeviceId, f: DeviceUpdate) -> Result<Option<Device>, DomainError> {
        match self.devices.get_mut(id.as_str()) {
            Some(mut entry) => {
                f(entry.value_mut());
                Ok(Some(entry.value().clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &DeviceId) -> Result<(), DomainError> {
        self.devices.remove(id.as_str());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMasterRepository {
    instances: Arc<DashMap<String, MasterInstance>>,
}

impl InMemoryMasterRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MasterRepository for InMemoryMasterRepository {
    async fn save(&self, instance: &MasterInstance) -> Result<(), DomainError> {
        self.instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MasterInstance>, DomainError> {
        Ok(self.instances.get(id).map(|e| e.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<MasterInstance>, DomainError> {
        Ok(self.instances.iter().map(|e| e.value().clone()).collect())
    }

    async fn delete(&self, id: &str) -> Result<(), DomainError> {
        self.instances.remove(id);
        Ok(())
    }
}

/// Active templates keyed by their (scope, target) key - activation is an
/// upsert, never an unbounded history.
#[derive(Clone, Default)]
pub struct InMemoryConfigRepository {
    templates: Arc<DashMap<String, ConfigTemplate>>,
}

impl InMemoryConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigRepository for InMemoryConfigRepository {
    async fn save_active(&self, template: &ConfigTemplate) -> Result<(), DomainError> {
        self.templates
            .insert(template.scope.key(), template.clone());
        Ok(())
    }

    async fn find_active(&self, scope_key: &str) -> Result<Option<ConfigTemplate>, DomainError> {
        Ok(self.templates.get(scope_key).map(|e| e.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<ConfigTemplate>, DomainError> {
        Ok(self.templates.iter().map(|e| e.value().clone()).collect())
    }

    async fn delete(&self, scope_key: &str) -> Result<(), DomainError> {
        self.templates.remove(scope_key);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCommandRepository {
    commands: Arc<DashMap<String, Command>>,
}

impl InMemoryCommandRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandRepository for InMemoryCommandRepository {
    async fn save(&self, command: &Command) -> Result<(), DomainError> {
        self.commands.insert(command.id.clone(), command.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Command>, DomainError> {
        Ok(self.commands.get(id).map(|e| e.value().clone()))
    }

    async fn find_pending(&self, device_id: &DeviceId) -> Result<Vec<Command>, DomainError> {
        Ok(self
            .commands
            .iter()
            .filter(|e| e.value().device_id == *device_id && !e.value().status.is_terminal())
            .map(|e| e.value().clone())
            .collect())
    }

    async fn find_filtered(
        &self,
        device_id: Option<&DeviceId>,
        status: Option<CommandStatus>,
    ) -> Result<Vec<Command>, DomainError> {
        Ok(self
            .commands
            .iter()
            .filter(|e| device_id.is_none_or(|id| e.value().device_id == *id))
            .filter(|e| status.is_none_or(|s| e.value().status == s))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update(&self, id: &str, f: CommandUpdate) -> Result<Option<Command>, DomainError> {
        match self.commands.get_mut(id) {
            Some(mut entry) => {
                f(entry.value_mut());
                Ok(Some(entry.value().clone()))
            }
            None => Ok(None),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryScriptRepository {
    scripts: Arc<DashMap<String, ScriptVersion>>,
}

impl InMemoryScriptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScriptRepository for InMemoryScriptRepository {
    async fn save(&self, script: &ScriptVersion) -> Result<(), DomainError> {
        self.scripts.insert(script.id.clone(), script.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ScriptVersion>, DomainError> {
        Ok(self.scripts.get(id).map(|e| e.value().clone()))
    }

    async fn find_active(&self, target_key: &str) -> Result<Option<ScriptVersion>, DomainError> {
        Ok(self
            .scripts
            .iter()
            .find(|e| e.value().is_active && e.value().target.key() == target_key)
            .map(|e| e.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<ScriptVersion>, DomainError> {
        Ok(self.scripts.iter().map(|e| e.value().clone()).collect())
    }
}
