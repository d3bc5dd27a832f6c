use std::sync::Arc;

use tracing::{info, warn};

use domain::device::{DeviceId, DeviceRepository};
use domain::error::Result;
use domain::master::{MasterInstance, MasterRepository};

/// Outcome of controller selection. `NoControllerAvailable` is a signaled
/// condition, not an error: the device falls back to local behavior.
#[derive(Debug, Clone)]
pub enum AssignmentOutcome {
    Assigned(MasterInstance),
    NoControllerAvailable,
}

/// Select the controller for a device from a snapshot of instances.
///
/// Lowest priority number among enabled instances wins; ties break by id
/// ascending. Pure over its input, so selection is testable without I/O.
pub fn select_master(instances: &[MasterInstance]) -> Option<&MasterInstance> {
    instances
        .iter()
        .filter(|m| m.enabled)
        .min_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)))
}

/// Resolves which control-plane instance a device reports to.
pub struct MasterAssignment {
    masters: Arc<dyn MasterRepository>,
    devices: Arc<dyn DeviceRepository>,
}

impl MasterAssignment {
    pub fn new(masters: Arc<dyn MasterRepository>, devices: Arc<dyn DeviceRepository>) -> Self {
        Self { masters, devices }
    }

    /// Run selection against the current instance snapshot and persist the
    /// result on the device record. Idempotent and safe to re-run after a
    /// crash between registration and assignment.
    pub async fn assign_controller(&self, device_id: &DeviceId) -> Result<AssignmentOutcome> {
        let instances = self.masters.find_all().await?;

        match select_master(&instances) {
            Some(master) => {
                let master_id = master.id.clone();
                let assigned = master.clone();

                self.devices
                    .update(
                        device_id,
                        Box::new(move |d| d.assigned_master_id = Some(master_id)),
                    )
                    .await?;

                info!(device_id = %device_id, master_id = %assigned.id, "Assigned controller");
                Ok(AssignmentOutcome::Assigned(assigned))
            }
            None => {
                warn!(device_id = %device_id, "No enabled controller available");
                Ok(AssignmentOutcome::NoControllerAvailable)
            }
        }
    }

    /// Re-run selection, used when the assigned instance is disabled or
    /// becomes unreachable. Overwrites any existing assignment.
    pub async fn reassign(&self, device_id: &DeviceId) -> Result<AssignmentOutcome> {
        self.assign_controller(device_id).await
    }
}
