use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use domain::config::{ConfigRepository, ConfigScope, ConfigTemplate};
use domain::device::{DeviceId, DeviceRepository};
use domain::error::Result;

/// Outcome of a configuration lookup. `Unchanged` and `NoConfiguration` are
/// valid "nothing to do" results, surfaced distinctly from failures.
#[derive(Debug, Clone)]
pub enum ConfigResolution {
    /// The caller's known hash matches the active template; payload omitted.
    Unchanged,
    Resolved {
        name: String,
        version: u32,
        payload: Value,
        content_hash: String,
    },
    /// No active template at any scope; caller may retain last-known config.
    NoConfiguration,
}

/// Resolves the effective configuration for a device by targeting priority:
/// device-specific, then type-specific, then the fallback template.
pub struct ConfigResolver {
    configs: Arc<dyn ConfigRepository>,
    devices: Arc<dyn DeviceRepository>,
}

impl ConfigResolver {
    pub fn new(configs: Arc<dyn ConfigRepository>, devices: Arc<dyn DeviceRepository>) -> Self {
        Self { configs, devices }
    }

    /// Resolve the highest-priority active template. When `known_hash`
    /// matches the active template's hash the payload is omitted, sparing a
    /// constrained device a wasted parse/apply cycle.
    pub async fn resolve(
        &self,
        device_id: &DeviceId,
        device_type: &str,
        known_hash: Option<&str>,
    ) -> Result<ConfigResolution> {
        let template = match self.find_effective(device_id, device_type).await? {
            Some(template) => template,
            None => return Ok(ConfigResolution::NoConfiguration),
        };

        if known_hash == Some(template.content_hash.as_str()) {
            return Ok(ConfigResolution::Unchanged);
        }

        // Record the served hash so operators can see rollout pickup.
        // The device may not be registered; that is not an error here.
        let served_hash = template.content_hash.clone();
        self.devices
            .update(
                device_id,
                Box::new(move |d| d.config_hash = Some(served_hash)),
            )
            .await?;

        Ok(ConfigResolution::Resolved {
            name: template.name,
            version: template.version,
            payload: template.payload,
            content_hash: template.content_hash,
        })
    }

    async fn find_effective(
        &self,
        device_id: &DeviceId,
        device_type: &str,
    ) -> Result<Option<ConfigTemplate>> {
        let device_key = ConfigScope::DeviceSpecific(device_id.to_string()).key();
        if let Some(template) = self.configs.find_active(&device_key).await? {
            return Ok(Some(template));
        }

        if !device_type.is_empty() {
            let type_key = ConfigScope::TypeSpecific(device_type.to_string()).key();
            if let Some(template) = self.configs.find_active(&type_key).await? {
                return Ok(Some(template));
            }
        }

        self.configs.find_active(&ConfigScope::Fallback.key()).await
    }

    /// Activate a template for its (scope, target) pair, superseding any
    /// prior active one. The version counter continues from the prior
    /// template; the content hash is derived at construction.
    pub async fn activate(
        &self,
        scope: ConfigScope,
        name: String,
        payload: Value,
    ) -> Result<ConfigTemplate> {
        let prior = self.configs.find_active(&scope.key()).await?;
        let version = prior.map(|p| p.version + 1).unwrap_or(1);

        let template = ConfigTemplate::new(scope, name, payload, version, Utc::now());
        self.configs.save_active(&template).await?;

        info!(
            scope = %template.scope.key(),
            version = template.version,
            content_hash = %template.content_hash,
            "Activated configuration template"
        );
        Ok(template)
    }

    pub async fn list(&self) -> Result<Vec<ConfigTemplate>> {
        self.configs.find_all().await
    }
}
