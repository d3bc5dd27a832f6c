//! End-to-end pass over the whole device loop: register, heartbeat, command
//! delivery, ack, and liveness demotion, wired exactly as the server wires
//! the services.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, json};

use application::assignment::MasterAssignment;
use application::command_queue::CommandQueue;
use application::heartbeat::{HeartbeatMonitor, LivenessPolicy};
use application::registry::{RegistrationRequest, Registry};
use domain::command::{CommandRepository, CommandStatus};
use domain::device::{DeviceId, DeviceRepository, DeviceStatus};
use domain::master::{MasterInstance, MasterRepository};
use infrastructure::{
    InMemoryCommandRepository, InMemoryDeviceRepository, InMemoryMasterRepository,
};

#[tokio::test]
async fn test_device_lifecycle_end_to_end() {
    let devices: Arc<dyn DeviceRepository> = Arc::new(InMemoryDeviceRepository::new());
    let masters: Arc<dyn MasterRepository> = Arc::new(InMemoryMasterRepository::new());
    let commands: Arc<dyn CommandRepository> = Arc::new(InMemoryCommandRepository::new());

    let mut primary = MasterInstance::new(
        "primary".to_string(),
        "Primary".to_string(),
        "http://10.0.0.5:4000".to_string(),
        10,
    );
    primary.enabled = true;
    masters.save(&primary).await.unwrap();

    let assignment = Arc::new(MasterAssignment::new(masters.clone(), devices.clone()));
    let registry = Registry::new(devices.clone(), assignment);
    let monitor = HeartbeatMonitor::new(
        devices.clone(),
        LivenessPolicy {
            heartbeat_interval: Duration::from_secs(10),
            offline_multiplier: 3,
            registration_grace: Duration::from_secs(300),
        },
    );
    let queue = CommandQueue::new(commands, devices.clone());

    // Register: Pending, assigned to the primary controller
    let device = registry
        .register(RegistrationRequest {
            device_id: "s1".to_string(),
            display_name: "Chamber 1".to_string(),
            device_type: "thermo".to_string(),
            capabilities: BTreeSet::from(["temperature".to_string()]),
            metadata: Map::new(),
        })
        .await
        .unwrap();
    assert_eq!(device.status, DeviceStatus::Pending);
    assert_eq!(device.assigned_master_id.as_deref(), Some("primary"));

    let id = DeviceId::new("s1").unwrap();

    // First heartbeat: Online
    let device = monitor.touch(&id, Some(json!({"uptime": 60}))).await.unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
    let t0 = device.last_seen_at.unwrap();

    // Operator queues a restart; the device polls exactly one command
    let cmd = queue
        .enqueue(&id, "restart".to_string(), json!({}), 1, 3, None)
        .await
        .unwrap();
    let polled = queue.poll_pending(&id, Utc::now()).await.unwrap();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].kind, "restart");

    // Delivered and acked: the queue drains
    queue.mark_delivered(&cmd.id).await.unwrap();
    let acked = queue.ack(&cmd.id, None).await.unwrap();
    assert_eq!(acked.status, CommandStatus::Acked);
    assert!(queue.poll_pending(&id, Utc::now()).await.unwrap().is_empty());

    // Silence past the offline threshold: sweep demotes
    let demoted = monitor
        .sweep_liveness(t0 + chrono::Duration::seconds(31))
        .await
        .unwrap();
    assert_eq!(demoted, 1);
    let device = devices.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(device.status, DeviceStatus::Offline);
}
