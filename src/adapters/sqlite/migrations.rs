//! Embedded schema migration management.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    Execution {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to read schema version: {0}")]
    VersionCheck(#[source] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply every embedded migration newer than the recorded version.
    /// Returns the number applied.
    pub async fn run(&self) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current = self.current_version().await?;
        let pending: Vec<_> = embedded_migrations()
            .into_iter()
            .filter(|m| m.version > current)
            .collect();

        for migration in &pending {
            self.apply(migration).await?;
        }

        Ok(pending.len())
    }

    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_optional(&self.pool)
                .await
                .map_err(MigrationError::VersionCheck)?;
        Ok(row.map_or(0, |(v,)| v))
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::Execution {
            version: 0,
            source: e,
        })?;
        Ok(())
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        sqlx::raw_sql(migration.sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::Execution {
                version: migration.version,
                source: e,
            })?;

        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::Execution {
                version: migration.version,
                source: e,
            })?;
        Ok(())
    }
}

pub fn embedded_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema",
        sql: include_str!("../../../migrations/001_initial_schema.sql"),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_test_pool;

    #[tokio::test]
    async fn test_migrations_apply_once() {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool);

        let applied = migrator.run().await.unwrap();
        assert_eq!(applied, 1);
        assert_eq!(migrator.current_version().await.unwrap(), 1);

        // Second run is a no-op
        let applied = migrator.run().await.unwrap();
        assert_eq!(applied, 0);
    }
}
