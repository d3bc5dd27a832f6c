use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Value object representing a device identifier
///
/// Rules:
/// - Must be non-empty
/// - Must contain only alphanumeric, underscore, hyphen, dot, and colon
/// - Max length 100 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new DeviceId with validation
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        // Validate non-empty
        if id.is_empty() {
            return Err(DomainError::InvalidIdentity(
                "Device ID cannot be empty".to_string(),
            ));
        }

        // Validate length
        if id.len() > 100 {
            return Err(DomainError::InvalidIdentity(format!(
                "Device ID too long: {} chars (max 100)",
                id.len()
            )));
        }

        // Validate characters
        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':')
        {
            return Err(DomainError::InvalidIdentity(format!(
                "Device ID {id} must contain only alphanumeric, underscore, hyphen, dot, and colon"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
