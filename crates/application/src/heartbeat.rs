use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use domain::device::{Device, DeviceId, DeviceRepository, DeviceStatus};
use domain::error::{DomainError, Result};

/// Liveness timing knobs.
///
/// A device is demoted once it has been silent for
/// `heartbeat_interval * offline_multiplier`; the multiplier keeps a single
/// jittered heartbeat from flapping the state machine. Registered-but-never-
/// heartbeated devices get `registration_grace` before demotion.
#[derive(Debug, Clone)]
pub struct LivenessPolicy {
    pub heartbeat_interval: Duration,
    pub offline_multiplier: u32,
    pub registration_grace: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
            offline_multiplier: 3,
            registration_grace: Duration::from_secs(300),
        }
    }
}

impl LivenessPolicy {
    pub fn offline_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            self.heartbeat_interval.as_secs() as i64 * self.offline_multiplier as i64,
        )
    }

    fn grace_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.registration_grace.as_secs() as i64)
    }

    /// Check-in hint returned to devices at registration.
    pub fn check_in_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }
}

/// Updates last-seen timestamps and derives online/offline status.
///
/// `touch` is the only Online path, the scheduled sweep the only Offline
/// path; a device oscillates between the two for its whole lifetime.
pub struct HeartbeatMonitor {
    devices: Arc<dyn DeviceRepository>,
    policy: LivenessPolicy,
}

impl HeartbeatMonitor {
    pub fn new(devices: Arc<dyn DeviceRepository>, policy: LivenessPolicy) -> Self {
        Self { devices, policy }
    }

    pub fn policy(&self) -> &LivenessPolicy {
        &self.policy
    }

    /// Record a heartbeat: sets `last_seen_at = now` and transitions to
    /// Online unconditionally.
    pub async fn touch(&self, device_id: &DeviceId, metrics: Option<Value>) -> Result<Device> {
        let now = Utc::now();
        self.devices
            .update(device_id, Box::new(move |d| d.touch(now, metrics)))
            .await?
            .ok_or_else(|| DomainError::UnknownDevice(device_id.to_string()))
    }

    /// Demote every device that has been silent past the threshold.
    ///
    /// Staleness is re-checked inside the per-key write so a heartbeat
    /// racing the sweep wins; each device costs one read-modify-write and
    /// no lock is held across devices. Returns the number demoted.
    pub async fn sweep_liveness(&self, now: DateTime<Utc>) -> Result<usize> {
        let threshold = self.policy.offline_threshold();
        let grace = self.policy.grace_threshold();

        let mut demoted = 0;
        for device in self.devices.find_all().await? {
            if device.status == DeviceStatus::Offline {
                continue;
            }
            if !device.is_stale(now, threshold, grace) {
                continue;
            }

            let updated = self
                .devices
                .update(
                    &device.id,
                    Box::new(move |d| {
                        if d.is_stale(now, threshold, grace) {
                            d.status = DeviceStatus::Offline;
                        }
                    }),
                )
                .await?;

            if let Some(d) = updated {
                if d.status == DeviceStatus::Offline {
                    warn!(device_id = %d.id, "Device heartbeat timeout. Marking Offline.");
                    demoted += 1;
                }
            }
        }
        Ok(demoted)
    }

    /// Background sweep loop. Runs until the token is cancelled; a pass in
    /// flight completes its current record before stopping.
    pub async fn run_sweeper(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.policy.heartbeat_interval);
        info!(
            threshold_secs = self.policy.offline_threshold().num_seconds(),
            "Liveness sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Liveness sweeper stopped");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_liveness(Utc::now()).await {
                        Ok(demoted) if demoted > 0 => {
                            info!(demoted, "Liveness sweep demoted stale devices");
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Liveness sweep failed: {}", e),
                    }
                }
            }
        }
    }
}
