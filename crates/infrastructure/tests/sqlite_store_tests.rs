use std::collections::BTreeSet;

use chrono::Utc;
use serde_json::{Map, json};

use domain::command::{Command, CommandRepository, CommandStatus};
use domain::config::{ConfigRepository, ConfigScope, ConfigTemplate};
use domain::device::{Device, DeviceId, DeviceRepository, DeviceStatus};
use domain::script::{ScriptRepository, ScriptTarget, ScriptVersion};
use infrastructure::SqliteFleetStore;

// The store implements every repository trait; the typed views below keep
// the shared method names (save, find_by_id, update) unambiguous.
async fn open_store() -> SqliteFleetStore {
    SqliteFleetStore::new("sqlite::memory:")
        .await
        .expect("in-memory sqlite store")
}

fn device(id: &str, device_type: &str) -> Device {
    Device::new(
        DeviceId::new(id).unwrap(),
        id.to_string(),
        device_type.to_string(),
        BTreeSet::new(),
        Map::new(),
        Utc::now(),
    )
}

#[tokio::test]
async fn test_device_round_trip_and_update() {
    let store = open_store().await;
    let devices: &dyn DeviceRepository = &store;
    let d = device("s1", "thermo");

    devices.save(&d).await.unwrap();

    let loaded = devices.find_by_id(&d.id).await.unwrap().unwrap();
    assert_eq!(loaded.device_type, "thermo");
    assert_eq!(loaded.status, DeviceStatus::Pending);

    let now = Utc::now();
    let updated = devices
        .update(
            &d.id,
            Box::new(move |dev| dev.touch(now, Some(json!({"rssi": -45})))),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, DeviceStatus::Online);

    // The mutation must be durable, not just returned
    let reloaded = devices.find_by_id(&d.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, DeviceStatus::Online);
    assert_eq!(reloaded.last_metrics, Some(json!({"rssi": -45})));
}

#[tokio::test]
async fn test_device_update_missing_returns_none() {
    let store = open_store().await;
    let devices: &dyn DeviceRepository = &store;

    let id = DeviceId::new("ghost").unwrap();
    let result = devices.update(&id, Box::new(|_| {})).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_device_delete_is_idempotent() {
    let store = open_store().await;
    let devices: &dyn DeviceRepository = &store;
    let d = device("s1", "thermo");
    devices.save(&d).await.unwrap();

    devices.delete(&d.id).await.unwrap();
    assert!(devices.find_by_id(&d.id).await.unwrap().is_none());
    // Second delete is not an error
    devices.delete(&d.id).await.unwrap();
}

#[tokio::test]
async fn test_command_status_filtering() {
    let store = open_store().await;
    let commands: &dyn CommandRepository = &store;
    let device_id = DeviceId::new("s1").unwrap();

    let mut acked = Command::new(
        "cmd-a".to_string(),
        device_id.clone(),
        "restart".to_string(),
        json!({}),
        1,
        3,
        None,
        Utc::now(),
    );
    acked.acknowledge(None, Utc::now());

    let pending = Command::new(
        "cmd-b".to_string(),
        device_id.clone(),
        "set_interval".to_string(),
        json!({"seconds": 30}),
        5,
        3,
        None,
        Utc::now(),
    );

    commands.save(&acked).await.unwrap();
    commands.save(&pending).await.unwrap();

    let open = commands.find_pending(&device_id).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, "cmd-b");

    let acked_list = commands
        .find_filtered(Some(&device_id), Some(CommandStatus::Acked))
        .await
        .unwrap();
    assert_eq!(acked_list.len(), 1);
    assert_eq!(acked_list[0].id, "cmd-a");
}

#[tokio::test]
async fn test_command_update_persists_status_column() {
    let store = open_store().await;
    let commands: &dyn CommandRepository = &store;
    let device_id = DeviceId::new("s1").unwrap();

    let cmd = Command::new(
        "cmd-1".to_string(),
        device_id.clone(),
        "restart".to_string(),
        json!({}),
        1,
        1,
        None,
        Utc::now(),
    );
    commands.save(&cmd).await.unwrap();

    let now = Utc::now();
    commands
        .update("cmd-1", Box::new(move |c| c.record_delivery(now)))
        .await
        .unwrap();

    // max_attempts = 1, so the command failed; status-column queries must see it
    let failed = commands
        .find_filtered(None, Some(CommandStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(commands.find_pending(&device_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_config_activation_is_an_upsert() {
    let store = open_store().await;
    let configs: &dyn ConfigRepository = &store;
    let scope = ConfigScope::TypeSpecific("thermo".to_string());

    let v1 = ConfigTemplate::new(
        scope.clone(),
        "thermo defaults".to_string(),
        json!({"polling_interval": 60}),
        1,
        Utc::now(),
    );
    configs.save_active(&v1).await.unwrap();

    let v2 = ConfigTemplate::new(
        scope.clone(),
        "thermo defaults".to_string(),
        json!({"polling_interval": 120}),
        2,
        Utc::now(),
    );
    configs.save_active(&v2).await.unwrap();

    let active = configs.find_active(&scope.key()).await.unwrap().unwrap();
    assert_eq!(active.version, 2);
    assert_eq!(configs.find_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_script_find_active_respects_flag() {
    let store = open_store().await;
    let scripts: &dyn ScriptRepository = &store;
    let target = ScriptTarget::DeviceType("thermo".to_string());

    let old = ScriptVersion {
        id: "script-1".to_string(),
        target: target.clone(),
        name: "blink".to_string(),
        description: String::new(),
        version: "1.0.0".to_string(),
        code: "{\"actions\":[]}".to_string(),
        is_active: false,
        published_at: Utc::now(),
    };
    let new = ScriptVersion {
        id: "script-2".to_string(),
        version: "1.1.0".to_string(),
        is_active: true,
        ..old.clone()
    };

    scripts.save(&old).await.unwrap();
    scripts.save(&new).await.unwrap();

    let active = scripts.find_active(&target.key()).await.unwrap().unwrap();
    assert_eq!(active.id, "script-2");
    assert_eq!(active.version, "1.1.0");

    // Both versions remain for audit
    assert_eq!(scripts.find_all().await.unwrap().len(), 2);
}
