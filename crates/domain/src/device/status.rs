use serde::{Deserialize, Serialize};

/// Device liveness status, derived from heartbeat activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Registered but never heartbeated
    Pending,
    /// Heartbeat received within the offline threshold
    Online,
    /// No heartbeat for at least the offline threshold
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::Pending
    }
}
