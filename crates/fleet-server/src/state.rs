use std::sync::Arc;

use anyhow::Result;

use application::{
    CommandQueue, ConfigResolver, HeartbeatMonitor, LivenessPolicy, MasterAssignment, Registry,
    ScriptDistributor,
};
use domain::command::CommandRepository;
use domain::config::ConfigRepository;
use domain::device::DeviceRepository;
use domain::master::MasterRepository;
use domain::script::ScriptRepository;
use infrastructure::{
    InMemoryCommandRepository, InMemoryConfigRepository, InMemoryDeviceRepository,
    InMemoryMasterRepository, InMemoryScriptRepository, SqliteFleetStore,
};

/// Shared service wiring for every API handler.
pub struct AppState {
    pub registry: Registry,
    pub assignment: Arc<MasterAssignment>,
    pub resolver: ConfigResolver,
    pub monitor: Arc<HeartbeatMonitor>,
    pub queue: CommandQueue,
    pub distributor: ScriptDistributor,
    pub masters: Arc<dyn MasterRepository>,
}

impl AppState {
    pub fn new(
        devices: Arc<dyn DeviceRepository>,
        masters: Arc<dyn MasterRepository>,
        configs: Arc<dyn ConfigRepository>,
        commands: Arc<dyn CommandRepository>,
        scripts: Arc<dyn ScriptRepository>,
        policy: LivenessPolicy,
    ) -> Self {
        let assignment = Arc::new(MasterAssignment::new(masters.clone(), devices.clone()));
        Self {
            registry: Registry::new(devices.clone(), assignment.clone()),
            resolver: ConfigResolver::new(configs, devices.clone()),
            monitor: Arc::new(HeartbeatMonitor::new(devices.clone(), policy)),
            queue: CommandQueue::new(commands, devices.clone()),
            distributor: ScriptDistributor::new(scripts, devices),
            assignment,
            masters,
        }
    }

    /// Volatile backend, useful for tests and single-node trials.
    pub fn in_memory(policy: LivenessPolicy) -> Self {
        Self::new(
            Arc::new(InMemoryDeviceRepository::new()),
            Arc::new(InMemoryMasterRepository::new()),
            Arc::new(InMemoryConfigRepository::new()),
            Arc::new(InMemoryCommandRepository::new()),
            Arc::new(InMemoryScriptRepository::new()),
            policy,
        )
    }

    /// Durable backend on one SQLite file (or `sqlite::memory:`).
    pub async fn with_sqlite(connection_string: &str, policy: LivenessPolicy) -> Result<Self> {
        let store = SqliteFleetStore::new(connection_string).await?;
        Ok(Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            policy,
        ))
    }
}
