use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use domain::command::{Command, CommandRepository, CommandStatus};
use domain::device::{DeviceId, DeviceRepository};
use domain::error::{DomainError, Result};

/// Per-device priority queue with at-least-once delivery.
///
/// Polling is read-only; delivery attempts are recorded explicitly so a
/// device that crashes mid-delivery sees the command again on its next
/// poll. Attempts are bounded by `max_attempts` to cap retry storms.
pub struct CommandQueue {
    commands: Arc<dyn CommandRepository>,
    devices: Arc<dyn DeviceRepository>,
}

impl CommandQueue {
    pub fn new(commands: Arc<dyn CommandRepository>, devices: Arc<dyn DeviceRepository>) -> Self {
        Self { commands, devices }
    }

    pub async fn enqueue(
        &self,
        device_id: &DeviceId,
        kind: String,
        payload: Value,
        priority: i32,
        max_attempts: u32,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Command> {
        if self.devices.find_by_id(device_id).await?.is_none() {
            return Err(DomainError::UnknownDevice(device_id.to_string()));
        }

        let command = Command::new(
            Uuid::new_v4().to_string(),
            device_id.clone(),
            kind,
            payload,
            priority,
            max_attempts,
            expires_at,
            Utc::now(),
        );
        self.commands.save(&command).await?;

        info!(
            command_id = %command.id,
            device_id = %device_id,
            kind = %command.kind,
            priority = command.priority,
            "Queued command"
        );
        Ok(command)
    }

    /// Commands awaiting acknowledgement for one device, most urgent first
    /// (priority ascending, ties oldest-first). Read-only: repeated polls
    /// return the same sequence until state changes. Expired commands are
    /// excluded but retained in the store.
    pub async fn poll_pending(&self, device_id: &DeviceId, now: DateTime<Utc>) -> Result<Vec<Command>> {
        let mut commands = self.commands.find_pending(device_id).await?;
        commands.retain(|c| !c.is_expired(now));
        commands.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(commands)
    }

    pub async fn pending_count(&self, device_id: &DeviceId, now: DateTime<Utc>) -> Result<usize> {
        Ok(self.poll_pending(device_id, now).await?.len())
    }

    /// Record one delivery attempt; exhausting `max_attempts` without an
    /// ack transitions the command to Failed.
    pub async fn mark_delivered(&self, command_id: &str) -> Result<Command> {
        let now = Utc::now();
        self.commands
            .update(command_id, Box::new(move |c| c.record_delivery(now)))
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("command {command_id}")))
    }

    /// Device acknowledgement; idempotent.
    pub async fn ack(&self, command_id: &str, result: Option<Value>) -> Result<Command> {
        let now = Utc::now();
        self.commands
            .update(command_id, Box::new(move |c| c.acknowledge(result, now)))
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("command {command_id}")))
    }

    /// Explicit device-reported failure; terminal.
    pub async fn fail(&self, command_id: &str, reason: String) -> Result<Command> {
        let now = Utc::now();
        self.commands
            .update(command_id, Box::new(move |c| c.fail(&reason, now)))
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("command {command_id}")))
    }

    /// Operator listing, optionally narrowed by device and status.
    pub async fn list(
        &self,
        device_id: Option<&DeviceId>,
        status: Option<CommandStatus>,
    ) -> Result<Vec<Command>> {
        let mut commands = self.commands.find_filtered(device_id, status).await?;
        commands.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(commands)
    }
}
