use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

use application::assignment::AssignmentOutcome;
use application::config_resolver::ConfigResolution;
use application::registry::{DeviceFilter, RegistrationRequest};
use application::script_distributor::ScriptUpdate;
use domain::DomainError;
use domain::command::CommandStatus;
use domain::config::ConfigScope;
use domain::device::DeviceId;
use domain::master::MasterInstance;
use domain::script::ScriptTarget;

use crate::state::AppState;

use tower_http::cors::{Any, CorsLayer};

type ApiError = (StatusCode, Json<Value>);

/// Device-facing routes are the polling contract constrained firmware
/// speaks (register, heartbeat, config, commands, script); the rest is the
/// operator surface consumed by the dashboard.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Device-facing
        .route("/api/fleet/register", post(register_device))
        .route("/api/fleet/heartbeat", post(heartbeat))
        .route("/api/fleet/config/{device_id}", get(get_config))
        .route("/api/fleet/script/{device_id}", get(get_script))
        .route("/api/fleet/devices/{device_id}/commands", get(poll_commands))
        .route(
            "/api/fleet/commands/{command_id}/delivered",
            post(mark_delivered),
        )
        .route("/api/fleet/commands/{command_id}/ack", post(ack_command))
        // Operator-facing
        .route("/api/fleet/devices", get(list_devices))
        .route(
            "/api/fleet/devices/{device_id}",
            get(get_device).delete(deregister_device),
        )
        .route(
            "/api/fleet/devices/{device_id}/reassign",
            post(reassign_device),
        )
        .route("/api/fleet/masters", get(list_masters).post(create_master))
        .route(
            "/api/fleet/masters/{master_id}",
            axum::routing::patch(update_master).delete(delete_master),
        )
        .route("/api/fleet/configs", get(list_configs).post(activate_config))
        .route(
            "/api/fleet/commands",
            get(list_commands).post(enqueue_command),
        )
        .route("/api/fleet/commands/{command_id}/fail", post(fail_command))
        .route("/api/fleet/scripts", get(list_scripts).post(publish_script))
        .layer(cors)
        .with_state(state)
}

fn error_response(err: DomainError) -> ApiError {
    let status = match &err {
        DomainError::InvalidIdentity(_) | DomainError::InvalidScript(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) | DomainError::UnknownDevice(_) => StatusCode::NOT_FOUND,
        DomainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}

fn parse_device_id(raw: &str) -> Result<DeviceId, ApiError> {
    DeviceId::new(raw).map_err(error_response)
}

// --- Device-facing handlers ---

async fn register_device(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<Value>, ApiError> {
    let device = state.registry.register(request).await.map_err(error_response)?;

    let assigned_master_endpoint = match &device.assigned_master_id {
        Some(master_id) => state
            .masters
            .find_by_id(master_id)
            .await
            .map_err(error_response)?
            .map(|m| m.endpoint),
        None => None,
    };

    Ok(Json(json!({
        "device_id": device.id,
        "status": device.status,
        "assigned_master_endpoint": assigned_master_endpoint,
        "check_in_interval": state.monitor.policy().check_in_interval_secs(),
    })))
}

#[derive(serde::Deserialize)]
struct HeartbeatRequest {
    device_id: String,
    #[serde(default)]
    metrics: Option<Value>,
    #[serde(default)]
    command_results: Vec<CommandResultReport>,
}

#[derive(serde::Deserialize)]
struct CommandResultReport {
    command_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<Value>, ApiError> {
    let device_id = parse_device_id(&request.device_id)?;

    state
        .monitor
        .touch(&device_id, request.metrics)
        .await
        .map_err(error_response)?;

    // Command results piggy-back on the heartbeat so constrained devices
    // need one request, not one per command.
    for report in request.command_results {
        let outcome = match report.status.as_deref() {
            Some("failed") | Some("error") => {
                let reason = report
                    .result
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or("device-reported failure")
                    .to_string();
                state.queue.fail(&report.command_id, reason).await
            }
            _ => state.queue.ack(&report.command_id, report.result).await,
        };

        if let Err(e) = outcome {
            warn!(command_id = %report.command_id, "Failed to apply command result: {}", e);
        }
    }

    let pending = state
        .queue
        .pending_count(&device_id, Utc::now())
        .await
        .map_err(error_response)?;

    Ok(Json(json!({ "ack": true, "pending_commands": pending })))
}

#[derive(serde::Deserialize)]
struct ConfigQuery {
    device_type: Option<String>,
    known_hash: Option<String>,
}

async fn get_config(
    Path(device_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
) -> Result<Json<Value>, ApiError> {
    let device_id = parse_device_id(&device_id)?;
    let device_type = match query.device_type {
        Some(device_type) => device_type,
        None => state
            .registry
            .get(&device_id)
            .await
            .map_err(error_response)?
            .map(|d| d.device_type)
            .unwrap_or_default(),
    };

    let resolution = state
        .resolver
        .resolve(&device_id, &device_type, query.known_hash.as_deref())
        .await
        .map_err(error_response)?;

    Ok(Json(match resolution {
        ConfigResolution::Unchanged => json!({ "unchanged": true }),
        ConfigResolution::Resolved {
            name,
            version,
            payload,
            content_hash,
        } => json!({
            "config_name": name,
            "config_version": version,
            "payload": payload,
            "content_hash": content_hash,
        }),
        ConfigResolution::NoConfiguration => json!({ "no_configuration": true }),
    }))
}

async fn poll_commands(
    Path(device_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let device_id = parse_device_id(&device_id)?;
    let commands = state
        .queue
        .poll_pending(&device_id, Utc::now())
        .await
        .map_err(error_response)?;

    let list: Vec<Value> = commands
        .iter()
        .map(|c| {
            json!({
                "command_id": c.id,
                "kind": c.kind,
                "payload": c.payload,
                "priority": c.priority,
            })
        })
        .collect();
    Ok(Json(json!(list)))
}

async fn mark_delivered(
    Path(command_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let command = state
        .queue
        .mark_delivered(&command_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "ack": true, "status": command.status })))
}

#[derive(serde::Deserialize, Default)]
struct AckRequest {
    #[serde(default)]
    result: Option<Value>,
}

async fn ack_command(
    Path(command_id): Path<String>,
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<Value>, ApiError> {
    // The body is optional; constrained firmware often acks with none
    let result = serde_json::from_slice::<AckRequest>(&body)
        .unwrap_or_default()
        .result;
    state
        .queue
        .ack(&command_id, result)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "ack": true })))
}

#[derive(serde::Deserialize)]
struct ScriptQuery {
    device_type: Option<String>,
    reported_version: Option<String>,
}

async fn get_script(
    Path(device_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScriptQuery>,
) -> Result<Json<Value>, ApiError> {
    let device_id = parse_device_id(&device_id)?;

    if let Some(version) = &query.reported_version {
        state
            .distributor
            .record_reported_version(&device_id, version.clone())
            .await
            .map_err(error_response)?;
    }

    let device_type = match query.device_type {
        Some(device_type) => device_type,
        None => state
            .registry
            .get(&device_id)
            .await
            .map_err(error_response)?
            .map(|d| d.device_type)
            .unwrap_or_default(),
    };

    let update = state
        .distributor
        .check_for_update(&device_id, &device_type, query.reported_version.as_deref())
        .await
        .map_err(error_response)?;

    Ok(Json(match update {
        ScriptUpdate::Update(script) => json!({
            "script_id": script.id,
            "name": script.name,
            "version": script.version,
            "code": script.code,
        }),
        ScriptUpdate::NoUpdate => json!({ "unchanged": true }),
    }))
}

// --- Operator-facing handlers ---

async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DeviceFilter>,
) -> Result<Json<Value>, ApiError> {
    let devices = state.registry.list(&filter).await.map_err(error_response)?;
    Ok(Json(json!(devices)))
}

async fn get_device(
    Path(device_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let device_id = parse_device_id(&device_id)?;
    let device = state
        .registry
        .get(&device_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(DomainError::NotFound(format!("device {device_id}"))))?;
    Ok(Json(json!(device)))
}

async fn deregister_device(
    Path(device_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let device_id = parse_device_id(&device_id)?;
    state
        .registry
        .deregister(&device_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "status": "deregistered" })))
}

async fn reassign_device(
    Path(device_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let device_id = parse_device_id(&device_id)?;
    let outcome = state
        .assignment
        .reassign(&device_id)
        .await
        .map_err(error_response)?;

    Ok(Json(match outcome {
        AssignmentOutcome::Assigned(master) => json!({
            "master_id": master.id,
            "endpoint": master.endpoint,
        }),
        AssignmentOutcome::NoControllerAvailable => json!({ "no_controller_available": true }),
    }))
}

async fn list_masters(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let mut instances = state.masters.find_all().await.map_err(error_response)?;
    instances.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

    let devices = state
        .registry
        .list(&DeviceFilter::default())
        .await
        .map_err(error_response)?;

    let list: Vec<Value> = instances
        .iter()
        .map(|m| {
            let registered = devices
                .iter()
                .filter(|d| d.assigned_master_id.as_deref() == Some(m.id.as_str()))
                .count();
            let mut value = json!(m);
            value["registered_devices"] = json!(registered);
            value
        })
        .collect();
    Ok(Json(json!(list)))
}

fn default_priority() -> i32 {
    100
}

#[derive(serde::Deserialize)]
struct CreateMasterRequest {
    master_id: String,
    display_name: String,
    #[serde(default)]
    description: String,
    endpoint: String,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    max_devices: Option<u32>,
}

async fn create_master(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateMasterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let existing = state
        .masters
        .find_by_id(&request.master_id)
        .await
        .map_err(error_response)?;
    if existing.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "Instance id already exists" })),
        ));
    }

    let instance = MasterInstance {
        id: request.master_id,
        display_name: request.display_name,
        description: request.description,
        endpoint: request.endpoint,
        priority: request.priority,
        enabled: request.enabled,
        max_devices: request.max_devices,
    };
    state.masters.save(&instance).await.map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(json!(instance))))
}

#[derive(serde::Deserialize)]
struct UpdateMasterRequest {
    display_name: Option<String>,
    description: Option<String>,
    endpoint: Option<String>,
    priority: Option<i32>,
    enabled: Option<bool>,
    max_devices: Option<u32>,
}

async fn update_master(
    Path(master_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateMasterRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut instance = state
        .masters
        .find_by_id(&master_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(DomainError::NotFound(format!("master {master_id}"))))?;

    if let Some(display_name) = request.display_name {
        instance.display_name = display_name;
    }
    if let Some(description) = request.description {
        instance.description = description;
    }
    if let Some(endpoint) = request.endpoint {
        instance.endpoint = endpoint;
    }
    if let Some(priority) = request.priority {
        instance.priority = priority;
    }
    if let Some(enabled) = request.enabled {
        instance.enabled = enabled;
    }
    if let Some(max_devices) = request.max_devices {
        instance.max_devices = Some(max_devices);
    }

    state.masters.save(&instance).await.map_err(error_response)?;
    Ok(Json(json!(instance)))
}

async fn delete_master(
    Path(master_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let existing = state
        .masters
        .find_by_id(&master_id)
        .await
        .map_err(error_response)?;
    if existing.is_none() {
        return Err(error_response(DomainError::NotFound(format!(
            "master {master_id}"
        ))));
    }

    state.masters.delete(&master_id).await.map_err(error_response)?;
    Ok(Json(json!({ "status": "deleted" })))
}

async fn list_configs(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let templates = state.resolver.list().await.map_err(error_response)?;
    Ok(Json(json!(templates)))
}

#[derive(serde::Deserialize)]
struct ActivateConfigRequest {
    /// Device-specific when set; otherwise type-specific; otherwise fallback
    device_id: Option<String>,
    device_type: Option<String>,
    name: String,
    payload: Value,
}

async fn activate_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ActivateConfigRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let scope = match (request.device_id, request.device_type) {
        (Some(device_id), _) => ConfigScope::DeviceSpecific(device_id),
        (None, Some(device_type)) => ConfigScope::TypeSpecific(device_type),
        (None, None) => ConfigScope::Fallback,
    };

    let template = state
        .resolver
        .activate(scope, request.name, request.payload)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(json!(template))))
}

#[derive(serde::Deserialize)]
struct CommandListQuery {
    device_id: Option<String>,
    status: Option<CommandStatus>,
}

async fn list_commands(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommandListQuery>,
) -> Result<Json<Value>, ApiError> {
    let device_id = query
        .device_id
        .as_deref()
        .map(parse_device_id)
        .transpose()?;

    let commands = state
        .queue
        .list(device_id.as_ref(), query.status)
        .await
        .map_err(error_response)?;
    Ok(Json(json!(commands)))
}

fn default_max_attempts() -> u32 {
    3
}

#[derive(serde::Deserialize)]
struct EnqueueCommandRequest {
    device_id: String,
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

async fn enqueue_command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnqueueCommandRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let device_id = parse_device_id(&request.device_id)?;
    let command = state
        .queue
        .enqueue(
            &device_id,
            request.kind,
            request.payload,
            request.priority,
            request.max_attempts,
            request.expires_at,
        )
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "command_id": command.id })),
    ))
}

#[derive(serde::Deserialize, Default)]
struct FailCommandRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn fail_command(
    Path(command_id): Path<String>,
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<Value>, ApiError> {
    let reason = serde_json::from_slice::<FailCommandRequest>(&body)
        .unwrap_or_default()
        .reason
        .unwrap_or_else(|| "operator-reported failure".to_string());

    state
        .queue
        .fail(&command_id, reason)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "ack": true })))
}

async fn list_scripts(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let scripts = state.distributor.list().await.map_err(error_response)?;
    Ok(Json(json!(scripts)))
}

#[derive(serde::Deserialize)]
struct PublishScriptRequest {
    /// Device-specific when set; otherwise type-specific
    device_id: Option<String>,
    device_type: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    version: String,
    code: String,
}

async fn publish_script(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishScriptRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let target = match (request.device_id, request.device_type) {
        (Some(device_id), _) => ScriptTarget::Device(device_id),
        (None, Some(device_type)) => ScriptTarget::DeviceType(device_type),
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "device_id or device_type is required" })),
            ));
        }
    };

    let script = state
        .distributor
        .publish(
            target,
            request.name,
            request.description,
            request.version,
            request.code,
        )
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(json!(script))))
}
