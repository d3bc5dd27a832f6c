//! SQLite-backed store implementing every repository trait on one pool.
//!
//! Rows carry the key columns the queries filter on plus the serialized
//! record, the same way the central buffer persists serialized payloads.
//! The pool is capped at one connection (SQLite is single-writer) and each
//! read-modify-write runs inside a transaction, so per-key atomicity holds
//! without any in-process locking.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite, sqlite::SqlitePoolOptions};

use domain::DomainError;
use domain::command::{Command, CommandRepository, CommandStatus, CommandUpdate};
use domain::config::{ConfigRepository, ConfigTemplate};
use domain::device::{Device, DeviceId, DeviceRepository, DeviceUpdate};
use domain::master::{MasterInstance, MasterRepository};
use domain::script::{ScriptRepository, ScriptVersion};

#[derive(Clone)]
pub struct SqliteFleetStore {
    pool: Pool<Sqlite>,
}

impl SqliteFleetStore {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1) // SQLite is single-writer
            .connect(connection_string)
            .await?;

        // Initialize tables
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                device_type TEXT NOT NULL,
                status TEXT NOT NULL,
                record TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS master_instances (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS config_templates (
                scope_key TEXT PRIMARY KEY,
                record TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS commands (
                id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                status TEXT NOT NULL,
                record TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS script_versions (
                id TEXT PRIMARY KEY,
                target_key TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                record TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

fn storage_err(e: impl std::fmt::Display) -> DomainError {
    DomainError::Storage(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, DomainError> {
    serde_json::to_string(value).map_err(storage_err)
}

fn decode<T: serde::de::DeserializeOwned>(record: &str) -> Result<T, DomainError> {
    serde_json::from_str(record).map_err(storage_err)
}

#[async_trait]
impl DeviceRepository for SqliteFleetStore {
    async fn save(&self, device: &Device) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT OR REPLACE INTO devices (id, device_type, status, record) VALUES (?, ?, ?, ?)",
        )
        .bind(device.id.as_str())
        .bind(&device.device_type)
        .bind(device.status.as_str())
        .bind(encode(device)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &DeviceId) -> Result<Option<Device>, DomainError> {
        let row = sqlx::query("SELECT record FROM devices WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| decode(&r.get::<String, _>(0))).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Device>, DomainError> {
        let rows = sqlx::query("SELECT record FROM devices ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter()
            .map(|r| decode(&r.get::<String, _>(0)))
            .collect()
    }

    async fn update(&self, id: &DeviceId, f: DeviceUpdate) -> Result<Option<Device>, DomainError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row = sqlx::query("SELECT record FROM devices WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(storage_err)?;
            return Ok(None);
        };

        let mut device: Device = decode(&row.get::<String, _>(0))?;
        f(&mut device);

        sqlx::query("UPDATE devices SET device_type = ?, status = ?, record = ? WHERE id = ?")
            .bind(&device.device_type)
            .bind(device.status.as_str())
            .bind(encode(&device)?)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(Some(device))
    }

    async fn delete(&self, id: &DeviceId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl MasterRepository for SqliteFleetStore {
    async fn save(&self, instance: &MasterInstance) -> Result<(), DomainError> {
        sqlx::query("INSERT OR REPLACE INTO master_instances (id, record) VALUES (?, ?)")
            .bind(&instance.id)
            .bind(encode(instance)?)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MasterInstance>, DomainError> {
        let row = sqlx::query("SELECT record FROM master_instances WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| decode(&r.get::<String, _>(0))).transpose()
    }

    async fn find_all(&self) -> Result<Vec<MasterInstance>, DomainError> {
        let rows = sqlx::query("SELECT record FROM master_instances ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter()
            .map(|r| decode(&r.get::<String, _>(0)))
            .collect()
    }

    async fn delete(&self, id: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM master_instances WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl ConfigRepository for SqliteFleetStore {
    async fn save_active(&self, template: &ConfigTemplate) -> Result<(), DomainError> {
        sqlx::query("INSERT OR REPLACE INTO config_templates (scope_key, record) VALUES (?, ?)")
            .bind(template.scope.key())
            .bind(encode(template)?)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn find_active(&self, scope_key: &str) -> Result<Option<ConfigTemplate>, DomainError> {
        let row = sqlx::query("SELECT record FROM config_templates WHERE scope_key = ?")
            .bind(scope_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| decode(&r.get::<String, _>(0))).transpose()
    }

    async fn find_all(&self) -> Result<Vec<ConfigTemplate>, DomainError> {
        let rows = sqlx::query("SELECT record FROM config_templates ORDER BY scope_key ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter()
            .map(|r| decode(&r.get::<String, _>(0)))
            .collect()
    }

    async fn delete(&self, scope_key: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM config_templates WHERE scope_key = ?")
            .bind(scope_key)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl CommandRepository for SqliteFleetStore {
    async fn save(&self, command: &Command) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT OR REPLACE INTO commands (id, device_id, status, record) VALUES (?, ?, ?, ?)",
        )
        .bind(&command.id)
        .bind(command.device_id.as_str())
        .bind(command.status.as_str())
        .bind(encode(command)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Command>, DomainError> {
        let row = sqlx::query("SELECT record FROM commands WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| decode(&r.get::<String, _>(0))).transpose()
    }

    async fn find_pending(&self, device_id: &DeviceId) -> Result<Vec<Command>, DomainError> {
        let rows = sqlx::query(
            "SELECT record FROM commands WHERE device_id = ? AND status IN ('pending', 'delivered')",
        )
        .bind(device_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter()
            .map(|r| decode(&r.get::<String, _>(0)))
            .collect()
    }

    async fn find_filtered(
        &self,
        device_id: Option<&DeviceId>,
        status: Option<CommandStatus>,
    ) -> Result<Vec<Command>, DomainError> {
        // Narrow in SQL where possible; both filters are optional
        let rows = match (device_id, status) {
            (Some(id), Some(status)) => {
                sqlx::query("SELECT record FROM commands WHERE device_id = ? AND status = ?")
                    .bind(id.as_str())
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            (Some(id), None) => {
                sqlx::query("SELECT record FROM commands WHERE device_id = ?")
                    .bind(id.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            (None, Some(status)) => {
                sqlx::query("SELECT record FROM commands WHERE status = ?")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            (None, None) => sqlx::query("SELECT record FROM commands").fetch_all(&self.pool).await,
        }
        .map_err(storage_err)?;

        rows.iter()
            .map(|r| decode(&r.get::<String, _>(0)))
            .collect()
    }

    async fn update(&self, id: &str, f: CommandUpdate) -> Result<Option<Command>, DomainError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row = sqlx::query("SELECT record FROM commands WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(storage_err)?;
            return Ok(None);
        };

        let mut command: Command = decode(&row.get::<String, _>(0))?;
        f(&mut command);

        sqlx::query("UPDATE commands SET status = ?, record = ? WHERE id = ?")
            .bind(command.status.as_str())
            .bind(encode(&command)?)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(Some(command))
    }
}

#[async_trait]
impl ScriptRepository for SqliteFleetStore {
    async fn save(&self, script: &ScriptVersion) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT OR REPLACE INTO script_versions (id, target_key, is_active, record) VALUES (?, ?, ?, ?)",
        )
        .bind(&script.id)
        .bind(script.target.key())
        .bind(script.is_active as i32)
        .bind(encode(script)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ScriptVersion>, DomainError> {
        let row = sqlx::query("SELECT record FROM script_versions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| decode(&r.get::<String, _>(0))).transpose()
    }

    async fn find_active(&self, target_key: &str) -> Result<Option<ScriptVersion>, DomainError> {
        let row = sqlx::query(
            "SELECT record FROM script_versions WHERE target_key = ? AND is_active = 1 LIMIT 1",
        )
        .bind(target_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(|r| decode(&r.get::<String, _>(0))).transpose()
    }

    async fn find_all(&self) -> Result<Vec<ScriptVersion>, DomainError> {
        let rows = sqlx::query("SELECT record FROM script_versions ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter()
            .map(|r| decode(&r.get::<String, _>(0)))
            .collect()
    }
}
