use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{Map, json};

use application::command_queue::CommandQueue;
use domain::DomainError;
use domain::command::{CommandRepository, CommandStatus};
use domain::device::{Device, DeviceId, DeviceRepository};
use infrastructure::{InMemoryCommandRepository, InMemoryDeviceRepository};

struct Queue {
    queue: CommandQueue,
    device_id: DeviceId,
}

async fn queue_with_device() -> Queue {
    let devices: Arc<dyn DeviceRepository> = Arc::new(InMemoryDeviceRepository::new());
    let commands: Arc<dyn CommandRepository> = Arc::new(InMemoryCommandRepository::new());

    let device_id = DeviceId::new("s1").unwrap();
    let device = Device::new(
        device_id.clone(),
        "Chamber 1".to_string(),
        "thermo".to_string(),
        BTreeSet::new(),
        Map::new(),
        Utc::now(),
    );
    devices.save(&device).await.unwrap();

    Queue {
        queue: CommandQueue::new(commands, devices),
        device_id,
    }
}

#[tokio::test]
async fn test_enqueue_rejects_unknown_device() {
    let q = queue_with_device().await;
    let ghost = DeviceId::new("ghost").unwrap();

    let err = q
        .queue
        .enqueue(&ghost, "restart".to_string(), json!({}), 1, 3, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::UnknownDevice(_)));
}

#[tokio::test]
async fn test_poll_orders_by_priority() {
    let q = queue_with_device().await;

    for priority in [5, 1, 3] {
        q.queue
            .enqueue(
                &q.device_id,
                format!("cmd-p{priority}"),
                json!({}),
                priority,
                3,
                None,
            )
            .await
            .unwrap();
    }

    let polled = q.queue.poll_pending(&q.device_id, Utc::now()).await.unwrap();
    let priorities: Vec<i32> = polled.iter().map(|c| c.priority).collect();
    assert_eq!(priorities, vec![1, 3, 5]);
}

#[tokio::test]
async fn test_equal_priority_ties_break_oldest_first() {
    let q = queue_with_device().await;

    let first = q
        .queue
        .enqueue(&q.device_id, "first".to_string(), json!({}), 10, 3, None)
        .await
        .unwrap();
    let second = q
        .queue
        .enqueue(&q.device_id, "second".to_string(), json!({}), 10, 3, None)
        .await
        .unwrap();

    let polled = q.queue.poll_pending(&q.device_id, Utc::now()).await.unwrap();
    assert_eq!(polled[0].id, first.id);
    assert_eq!(polled[1].id, second.id);
}

#[tokio::test]
async fn test_polling_is_read_only() {
    let q = queue_with_device().await;
    q.queue
        .enqueue(&q.device_id, "restart".to_string(), json!({}), 1, 3, None)
        .await
        .unwrap();

    // Repeated polls return the same sequence until state changes
    let first = q.queue.poll_pending(&q.device_id, Utc::now()).await.unwrap();
    let second = q.queue.poll_pending(&q.device_id, Utc::now()).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].attempts, 0);
    assert_eq!(second[0].attempts, 0);
    assert_eq!(first[0].status, CommandStatus::Pending);
}

#[tokio::test]
async fn test_bounded_retries() {
    let q = queue_with_device().await;
    let cmd = q
        .queue
        .enqueue(&q.device_id, "restart".to_string(), json!({}), 1, 3, None)
        .await
        .unwrap();

    // Three deliveries without an ack exhaust max_attempts
    q.queue.mark_delivered(&cmd.id).await.unwrap();
    q.queue.mark_delivered(&cmd.id).await.unwrap();
    let failed = q.queue.mark_delivered(&cmd.id).await.unwrap();
    assert_eq!(failed.status, CommandStatus::Failed);
    assert_eq!(failed.attempts, 3);

    // A fourth delivery is a no-op, not a resurrection
    let still_failed = q.queue.mark_delivered(&cmd.id).await.unwrap();
    assert_eq!(still_failed.status, CommandStatus::Failed);
    assert_eq!(still_failed.attempts, 3);

    // Failed commands are recorded and listable, never silently dropped
    let failed_list = q
        .queue
        .list(Some(&q.device_id), Some(CommandStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed_list.len(), 1);
}

#[tokio::test]
async fn test_ack_removes_from_poll_and_is_idempotent() {
    let q = queue_with_device().await;
    let cmd = q
        .queue
        .enqueue(&q.device_id, "restart".to_string(), json!({}), 1, 3, None)
        .await
        .unwrap();

    q.queue.mark_delivered(&cmd.id).await.unwrap();
    let acked = q
        .queue
        .ack(&cmd.id, Some(json!({"result": "success"})))
        .await
        .unwrap();
    assert_eq!(acked.status, CommandStatus::Acked);

    assert!(q.queue.poll_pending(&q.device_id, Utc::now()).await.unwrap().is_empty());

    // Acking twice is a no-op, not an error
    let again = q.queue.ack(&cmd.id, None).await.unwrap();
    assert_eq!(again.status, CommandStatus::Acked);
    assert_eq!(again.result, Some(json!({"result": "success"})));
}

#[tokio::test]
async fn test_explicit_fail_is_terminal() {
    let q = queue_with_device().await;
    let cmd = q
        .queue
        .enqueue(&q.device_id, "restart".to_string(), json!({}), 1, 3, None)
        .await
        .unwrap();

    let failed = q
        .queue
        .fail(&cmd.id, "relay stuck".to_string())
        .await
        .unwrap();
    assert_eq!(failed.status, CommandStatus::Failed);
    assert_eq!(failed.result, Some(json!({"reason": "relay stuck"})));
}

#[tokio::test]
async fn test_expired_commands_are_not_polled() {
    let q = queue_with_device().await;
    let now = Utc::now();

    q.queue
        .enqueue(
            &q.device_id,
            "stale".to_string(),
            json!({}),
            1,
            3,
            Some(now + Duration::seconds(60)),
        )
        .await
        .unwrap();

    assert_eq!(q.queue.poll_pending(&q.device_id, now).await.unwrap().len(), 1);

    let later = now + Duration::seconds(61);
    assert!(q.queue.poll_pending(&q.device_id, later).await.unwrap().is_empty());

    // The record is retained for audit
    assert_eq!(q.queue.list(Some(&q.device_id), None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_command_is_not_found() {
    let q = queue_with_device().await;
    let err = q.queue.ack("missing", None).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}
