//! SQLite implementation of the capability registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{CoordinationError, CoordinationResult};
use crate::domain::models::{CapabilityRecord, CapabilityVersion};
use crate::domain::ports::CapabilityRegistry;

#[derive(Clone)]
pub struct SqliteCapabilityRegistry {
    pool: SqlitePool,
}

impl SqliteCapabilityRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CapabilityRegistry for SqliteCapabilityRegistry {
    async fn register(
        &self,
        agent_id: &str,
        capability_id: &str,
        version: CapabilityVersion,
    ) -> CoordinationResult<()> {
        if !crate::domain::models::is_valid_capability_id(capability_id) {
            return Err(CoordinationError::Validation(format!(
                "Malformed capability id: {capability_id:?}"
            )));
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO capabilities (agent_id, capability_id, version, is_active,
               registered_at, last_verified_at)
               VALUES (?, ?, ?, 1, ?, ?)
               ON CONFLICT(agent_id, capability_id) DO UPDATE SET
                   version = excluded.version,
                   is_active = 1,
                   last_verified_at = excluded.last_verified_at"#,
        )
        .bind(agent_id)
        .bind(capability_id)
        .bind(version.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn deactivate(&self, agent_id: &str, capability_id: &str) -> CoordinationResult<bool> {
        let result = sqlx::query(
            "UPDATE capabilities SET is_active = 0, last_verified_at = ?
             WHERE agent_id = ? AND capability_id = ? AND is_active = 1",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(agent_id)
        .bind(capability_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_all(&self, agent_id: &str) -> CoordinationResult<u64> {
        let result = sqlx::query(
            "UPDATE capabilities SET is_active = 0, last_verified_at = ?
             WHERE agent_id = ? AND is_active = 1",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_agents_for(
        &self,
        capability_id: &str,
        min_version: Option<CapabilityVersion>,
    ) -> CoordinationResult<Vec<String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT agent_id, version FROM capabilities
             WHERE capability_id = ? AND is_active = 1",
        )
        .bind(capability_id)
        .fetch_all(&self.pool)
        .await?;

        // Version strings sort numerically only after parsing, so the
        // ordering happens here rather than in SQL.
        let mut matches: Vec<(String, CapabilityVersion)> = rows
            .into_iter()
            .map(|(agent_id, version)| {
                version
                    .parse::<CapabilityVersion>()
                    .map(|v| (agent_id, v))
                    .map_err(|e| CoordinationError::Serialization(e.to_string()))
            })
            .collect::<Result<_, _>>()?;

        if let Some(min) = min_version {
            matches.retain(|(_, v)| *v >= min);
        }
        matches.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(matches.into_iter().map(|(agent_id, _)| agent_id).collect())
    }

    async fn get(&self, agent_id: &str) -> CoordinationResult<Vec<CapabilityRecord>> {
        let rows: Vec<CapabilityRow> = sqlx::query_as(
            "SELECT agent_id, capability_id, version, is_active, registered_at, last_verified_at
             FROM capabilities WHERE agent_id = ? ORDER BY capability_id",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CapabilityRecord::try_from).collect()
    }

    async fn active_capabilities(&self, agent_id: &str) -> CoordinationResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT capability_id FROM capabilities
             WHERE agent_id = ? AND is_active = 1 ORDER BY capability_id",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[derive(sqlx::FromRow)]
struct CapabilityRow {
    agent_id: String,
    capability_id: String,
    version: String,
    is_active: i64,
    registered_at: String,
    last_verified_at: String,
}

impl TryFrom<CapabilityRow> for CapabilityRecord {
    type Error = CoordinationError;

    fn try_from(row: CapabilityRow) -> Result<Self, Self::Error> {
        let version = row
            .version
            .parse::<CapabilityVersion>()
            .map_err(|e| CoordinationError::Serialization(e.to_string()))?;

        Ok(CapabilityRecord {
            agent_id: row.agent_id,
            capability_id: row.capability_id,
            version,
            is_active: row.is_active != 0,
            registered_at: parse_timestamp(&row.registered_at)?,
            last_verified_at: parse_timestamp(&row.last_verified_at)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, CoordinationError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CoordinationError::Serialization(e.to_string()))
}
