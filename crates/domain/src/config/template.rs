use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::content_hash;

/// Targeting scope of a configuration template.
///
/// Resolution order is DeviceSpecific > TypeSpecific > Fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "target", rename_all = "snake_case")]
pub enum ConfigScope {
    DeviceSpecific(String),
    TypeSpecific(String),
    Fallback,
}

impl ConfigScope {
    /// Storage key identifying the (scope, target) pair.
    pub fn key(&self) -> String {
        match self {
            Self::DeviceSpecific(device_id) => format!("device:{device_id}"),
            Self::TypeSpecific(device_type) => format!("type:{device_type}"),
            Self::Fallback => "fallback".to_string(),
        }
    }
}

/// A named configuration payload with a targeting scope.
///
/// At most one template is active per (scope, target) pair; activating a new
/// one supersedes the prior. `content_hash` is derived from the payload at
/// construction so resolve never mixes an old payload with a new hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigTemplate {
    pub scope: ConfigScope,
    pub name: String,
    pub payload: Value,
    pub content_hash: String,
    pub version: u32,
    pub activated_at: DateTime<Utc>,
}

impl ConfigTemplate {
    pub fn new(
        scope: ConfigScope,
        name: String,
        payload: Value,
        version: u32,
        activated_at: DateTime<Utc>,
    ) -> Self {
        let content_hash = content_hash(&payload);
        Self {
            scope,
            name,
            payload,
            content_hash,
            version,
            activated_at,
        }
    }
}
