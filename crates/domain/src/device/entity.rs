use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::{DeviceId, DeviceStatus};

/// A registered fleet node (sensor, controller) that phones home.
///
/// The record is the single source of truth for a device's lifecycle:
/// `status` and `last_seen_at` are owned by the heartbeat monitor,
/// `assigned_master_id` by master assignment, `config_hash` and
/// `reported_script_version` by the resolver/distributor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub display_name: String,
    pub device_type: String,
    pub status: DeviceStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub assigned_master_id: Option<String>,
    pub capabilities: BTreeSet<String>,
    pub metadata: Map<String, Value>,
    /// Last metrics payload reported with a heartbeat (uptime, memory, RSSI)
    pub last_metrics: Option<Value>,
    /// Hash of the configuration most recently served to this device
    pub config_hash: Option<String>,
    /// Script version the device last reported running
    pub reported_script_version: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl Device {
    pub fn new(
        id: DeviceId,
        display_name: String,
        device_type: String,
        capabilities: BTreeSet<String>,
        metadata: Map<String, Value>,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            display_name,
            device_type,
            status: DeviceStatus::Pending,
            last_seen_at: None,
            assigned_master_id: None,
            capabilities,
            metadata,
            last_metrics: None,
            config_hash: None,
            reported_script_version: None,
            registered_at,
        }
    }

    /// Merge a re-registration into this record.
    ///
    /// Refreshes the caller-supplied descriptive fields; metadata keys are
    /// merged (latest call wins per key). Lifecycle fields - `status`,
    /// `last_seen_at`, `registered_at`, `assigned_master_id` - are untouched.
    pub fn merge_registration(
        &mut self,
        display_name: String,
        device_type: String,
        capabilities: BTreeSet<String>,
        metadata: Map<String, Value>,
    ) {
        self.display_name = display_name;
        self.device_type = device_type;
        self.capabilities = capabilities;
        for (key, value) in metadata {
            self.metadata.insert(key, value);
        }
    }

    /// Record a heartbeat: the device is online as of `now`.
    pub fn touch(&mut self, now: DateTime<Utc>, metrics: Option<Value>) {
        self.last_seen_at = Some(now);
        self.status = DeviceStatus::Online;
        if metrics.is_some() {
            self.last_metrics = metrics;
        }
    }

    /// Whether the liveness sweep should demote this device at `now`.
    ///
    /// A device that has heartbeated is stale once `last_seen_at` is older
    /// than `offline_threshold`; one that never has is given
    /// `registration_grace` from its registration before demotion.
    pub fn is_stale(
        &self,
        now: DateTime<Utc>,
        offline_threshold: chrono::Duration,
        registration_grace: chrono::Duration,
    ) -> bool {
        match self.last_seen_at {
            Some(seen) => now - seen >= offline_threshold,
            None => now - self.registered_at >= registration_grace,
        }
    }
}
