use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use domain::device::{DeviceId, DeviceRepository};
use domain::error::{DomainError, Result};
use domain::script::{ScriptRepository, ScriptTarget, ScriptVersion};

/// Result of a device's script poll.
#[derive(Debug, Clone)]
pub enum ScriptUpdate {
    Update(ScriptVersion),
    /// No active script, or the device already runs the active version.
    NoUpdate,
}

/// Tracks the active versioned payload per target and hands it out only
/// when newer than what the device last reported - the same polling and
/// versioning contract configuration uses.
pub struct ScriptDistributor {
    scripts: Arc<dyn ScriptRepository>,
    devices: Arc<dyn DeviceRepository>,
}

impl ScriptDistributor {
    pub fn new(scripts: Arc<dyn ScriptRepository>, devices: Arc<dyn DeviceRepository>) -> Self {
        Self { scripts, devices }
    }

    /// Publish a new version for a target, deactivating the prior active
    /// one. The payload is opaque; only emptiness is rejected.
    pub async fn publish(
        &self,
        target: ScriptTarget,
        name: String,
        description: String,
        version: String,
        code: String,
    ) -> Result<ScriptVersion> {
        if code.trim().is_empty() {
            return Err(DomainError::InvalidScript(
                "script code cannot be empty".to_string(),
            ));
        }

        if let Some(mut prior) = self.scripts.find_active(&target.key()).await? {
            prior.is_active = false;
            self.scripts.save(&prior).await?;
        }

        let script = ScriptVersion {
            id: Uuid::new_v4().to_string(),
            target,
            name,
            description,
            version,
            code,
            is_active: true,
            published_at: Utc::now(),
        };
        self.scripts.save(&script).await?;

        info!(
            script_id = %script.id,
            target = %script.target.key(),
            version = %script.version,
            "Published script version"
        );
        Ok(script)
    }

    /// Device-specific active script first, then type-specific. Returns
    /// `NoUpdate` when the device already reports the active version, so an
    /// unchanged payload is never re-downloaded over a constrained link.
    /// Read-only.
    pub async fn check_for_update(
        &self,
        device_id: &DeviceId,
        device_type: &str,
        reported_version: Option<&str>,
    ) -> Result<ScriptUpdate> {
        let device_key = ScriptTarget::Device(device_id.to_string()).key();
        let mut active = self.scripts.find_active(&device_key).await?;

        if active.is_none() && !device_type.is_empty() {
            let type_key = ScriptTarget::DeviceType(device_type.to_string()).key();
            active = self.scripts.find_active(&type_key).await?;
        }

        match active {
            Some(script) if reported_version != Some(script.version.as_str()) => {
                Ok(ScriptUpdate::Update(script))
            }
            _ => Ok(ScriptUpdate::NoUpdate),
        }
    }

    /// Record the version a device reports running, for operator rollout
    /// visibility. Unknown devices are ignored (the report is advisory).
    pub async fn record_reported_version(
        &self,
        device_id: &DeviceId,
        version: String,
    ) -> Result<()> {
        self.devices
            .update(
                device_id,
                Box::new(move |d| d.reported_script_version = Some(version)),
            )
            .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ScriptVersion>> {
        self.scripts.find_all().await
    }
}
