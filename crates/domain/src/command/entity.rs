use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::device::DeviceId;

/// Delivery state of a queued command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Queued, not yet handed to the device
    Pending,
    /// Handed to the device at least once, awaiting acknowledgement
    Delivered,
    /// Device confirmed execution
    Acked,
    /// Exhausted retries or explicitly failed
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Acked => "acked",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Acked | Self::Failed)
    }
}

/// A unit of work queued for a specific device.
///
/// Delivery is at-least-once: polling is read-only, delivery is recorded
/// explicitly, and only a device acknowledgement reaches `Acked`. Terminal
/// records are retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub device_id: DeviceId,
    pub kind: String,
    pub payload: Value,
    /// Lower number = more urgent
    pub priority: i32,
    pub status: CommandStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub expires_at: Option<DateTime<Utc>>,
    /// Device-reported outcome, attached on ack or failure
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Command {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        device_id: DeviceId,
        kind: String,
        payload: Value,
        priority: i32,
        max_attempts: u32,
        expires_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            device_id,
            kind,
            payload,
            priority,
            status: CommandStatus::Pending,
            attempts: 0,
            max_attempts,
            expires_at,
            result: None,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if now >= expiry)
    }

    /// Record one delivery attempt. Once `attempts` reaches `max_attempts`
    /// without an ack the command fails instead of retrying forever.
    /// No-op on terminal commands.
    pub fn record_delivery(&mut self, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            self.status = CommandStatus::Failed;
            self.result = Some(json!({"reason": "max delivery attempts exhausted"}));
            self.completed_at = Some(now);
        } else {
            self.status = CommandStatus::Delivered;
        }
    }

    /// Device acknowledgement. Idempotent: acking a terminal command is a
    /// no-op and never resurrects a Failed one.
    pub fn acknowledge(&mut self, result: Option<Value>, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = CommandStatus::Acked;
        self.result = result;
        self.completed_at = Some(now);
    }

    /// Explicit caller-reported failure. Terminal.
    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = CommandStatus::Failed;
        self.result = Some(json!({"reason": reason}));
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(max_attempts: u32) -> Command {
        Command::new(
            "cmd-1".to_string(),
            DeviceId::new("s1").unwrap(),
            "restart".to_string(),
            json!({}),
            100,
            max_attempts,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn test_delivery_below_limit_stays_retryable() {
        let mut cmd = command(3);
        cmd.record_delivery(Utc::now());
        assert_eq!(cmd.status, CommandStatus::Delivered);
        assert_eq!(cmd.attempts, 1);
    }

    #[test]
    fn test_bounded_retries() {
        let mut cmd = command(3);
        for _ in 0..3 {
            cmd.record_delivery(Utc::now());
        }
        assert_eq!(cmd.status, CommandStatus::Failed);
        assert_eq!(cmd.attempts, 3);

        // A fourth delivery must not resurrect it
        cmd.record_delivery(Utc::now());
        assert_eq!(cmd.status, CommandStatus::Failed);
        assert_eq!(cmd.attempts, 3);
    }

    #[test]
    fn test_ack_is_idempotent() {
        let mut cmd = command(3);
        cmd.record_delivery(Utc::now());
        cmd.acknowledge(Some(json!({"ok": true})), Utc::now());
        assert_eq!(cmd.status, CommandStatus::Acked);

        cmd.acknowledge(None, Utc::now());
        assert_eq!(cmd.status, CommandStatus::Acked);
        assert_eq!(cmd.result, Some(json!({"ok": true})));
    }

    #[test]
    fn test_ack_does_not_resurrect_failed() {
        let mut cmd = command(1);
        cmd.record_delivery(Utc::now());
        assert_eq!(cmd.status, CommandStatus::Failed);

        cmd.acknowledge(None, Utc::now());
        assert_eq!(cmd.status, CommandStatus::Failed);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut cmd = command(3);
        cmd.expires_at = Some(now + chrono::Duration::seconds(60));
        assert!(!cmd.is_expired(now));
        assert!(cmd.is_expired(now + chrono::Duration::seconds(61)));
    }
}
