use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Targeting of a script version: one device, or every device of a type.
/// Device-specific overrides type-specific, mirroring configuration
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "target", content = "value", rename_all = "snake_case")]
pub enum ScriptTarget {
    Device(String),
    DeviceType(String),
}

impl ScriptTarget {
    pub fn key(&self) -> String {
        match self {
            Self::Device(device_id) => format!("device:{device_id}"),
            Self::DeviceType(device_type) => format!("type:{device_type}"),
        }
    }
}

/// A versioned behavior payload distributed to devices.
///
/// At most one version is active per target; devices poll with the version
/// they are running and only download when it differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptVersion {
    pub id: String,
    pub target: ScriptTarget,
    pub name: String,
    pub description: String,
    pub version: String,
    pub code: String,
    pub is_active: bool,
    pub published_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_keys_are_distinct() {
        assert_eq!(ScriptTarget::Device("s1".into()).key(), "device:s1");
        assert_eq!(
            ScriptTarget::DeviceType("thermo".into()).key(),
            "type:thermo"
        );
    }
}
