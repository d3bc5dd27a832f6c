use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use domain::device::{Device, DeviceId, DeviceRepository, DeviceStatus};
use domain::error::Result;

use crate::assignment::{AssignmentOutcome, MasterAssignment};

/// Caller-supplied registration payload (phone-home).
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub device_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Optional narrowing for device listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceFilter {
    pub status: Option<DeviceStatus>,
    pub device_type: Option<String>,
}

/// Owns the device lifecycle: register, lookup, list, deregister.
pub struct Registry {
    devices: Arc<dyn DeviceRepository>,
    assignment: Arc<MasterAssignment>,
}

impl Registry {
    pub fn new(devices: Arc<dyn DeviceRepository>, assignment: Arc<MasterAssignment>) -> Self {
        Self {
            devices,
            assignment,
        }
    }

    /// Idempotent upsert. A re-registration merges descriptive fields and
    /// leaves lifecycle state untouched; a first registration creates a
    /// Pending record and triggers controller assignment.
    pub async fn register(&self, request: RegistrationRequest) -> Result<Device> {
        let id = DeviceId::new(&request.device_id)?;

        let RegistrationRequest {
            display_name,
            device_type,
            capabilities,
            metadata,
            ..
        } = request;

        let merged = self
            .devices
            .update(
                &id,
                Box::new({
                    let display_name = display_name.clone();
                    let device_type = device_type.clone();
                    let capabilities = capabilities.clone();
                    let metadata = metadata.clone();
                    move |d| d.merge_registration(display_name, device_type, capabilities, metadata)
                }),
            )
            .await?;

        let mut device = match merged {
            Some(device) => {
                info!(device_id = %id, "Updated device registration");
                device
            }
            None => {
                let device = Device::new(
                    id.clone(),
                    display_name,
                    device_type,
                    capabilities,
                    metadata,
                    Utc::now(),
                );
                self.devices.save(&device).await?;
                info!(device_id = %id, device_type = %device.device_type, "Registered new device");
                device
            }
        };

        if device.assigned_master_id.is_none() {
            if let AssignmentOutcome::Assigned(master) =
                self.assignment.assign_controller(&id).await?
            {
                device.assigned_master_id = Some(master.id);
            }
        }

        Ok(device)
    }

    pub async fn get(&self, device_id: &DeviceId) -> Result<Option<Device>> {
        self.devices.find_by_id(device_id).await
    }

    /// Snapshot listing, finite and restartable.
    pub async fn list(&self, filter: &DeviceFilter) -> Result<Vec<Device>> {
        let mut devices = self.devices.find_all().await?;
        if let Some(status) = filter.status {
            devices.retain(|d| d.status == status);
        }
        if let Some(device_type) = &filter.device_type {
            devices.retain(|d| &d.device_type == device_type);
        }
        devices.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(devices)
    }

    /// Idempotent removal; deregistering an unknown device is not an error.
    pub async fn deregister(&self, device_id: &DeviceId) -> Result<()> {
        self.devices.delete(device_id).await?;
        info!(device_id = %device_id, "Deregistered device");
        Ok(())
    }
}
