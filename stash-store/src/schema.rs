//! Storage lifecycle: connecting, migrating and reporting schema status.
//!
//! The schema lives in the workspace `migrations/` directory and is embedded
//! at compile time.

use crate::error::{StoreError, StoreResult};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Row, SqliteConnection};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Embedded ledger migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Open the storage connection the executor will own.
///
/// Foreign keys are enforced and every commit is fully synced.
pub async fn connect(url: &str) -> StoreResult<SqliteConnection> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_secs(5));

    let conn = options.connect().await?;
    info!(url, "Storage connection opened");
    Ok(conn)
}

/// Run all pending migrations.
///
/// Idempotent: safe to run multiple times.
pub async fn migrate(conn: &mut SqliteConnection) -> StoreResult<()> {
    info!("Running database migrations...");
    MIGRATOR.run(&mut *conn).await?;
    info!("Migrations completed successfully");
    Ok(())
}

/// One row of the migration history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: i64,
    pub description: String,
    pub success: bool,
}

/// Migration state of a database
#[derive(Debug, Clone, Default)]
pub struct SchemaStatus {
    /// Migrations recorded in the database, oldest first
    pub applied: Vec<AppliedMigration>,
    /// Embedded migrations not yet applied
    pub pending: Vec<i64>,
}

impl SchemaStatus {
    /// True when every embedded migration has been applied successfully
    pub fn is_current(&self) -> bool {
        self.pending.is_empty() && self.applied.iter().all(|m| m.success)
    }
}

/// Check connectivity and compare applied migrations with the embedded set.
pub async fn status(conn: &mut SqliteConnection) -> StoreResult<SchemaStatus> {
    let alive: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&mut *conn).await?;
    if alive != 1 {
        return Err(StoreError::Database("connectivity check failed".to_string()));
    }

    let history: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(&mut *conn)
    .await?;

    let mut applied = Vec::new();
    if history > 0 {
        let rows = sqlx::query(
            "SELECT version, description, success FROM _sqlx_migrations ORDER BY version",
        )
        .fetch_all(&mut *conn)
        .await?;

        for row in rows {
            applied.push(AppliedMigration {
                version: row.try_get("version")?,
                description: row.try_get("description")?,
                success: row.try_get("success")?,
            });
        }
    }

    let pending = MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .filter(|m| !applied.iter().any(|a| a.version == m.version))
        .map(|m| m.version)
        .collect();

    Ok(SchemaStatus { applied, pending })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_reports_pending_then_current() {
        let mut conn = connect("sqlite::memory:").await.unwrap();

        let before = status(&mut conn).await.unwrap();
        assert!(before.applied.is_empty());
        assert!(!before.pending.is_empty());
        assert!(!before.is_current());

        migrate(&mut conn).await.unwrap();
        // second run is a no-op
        migrate(&mut conn).await.unwrap();

        let after = status(&mut conn).await.unwrap();
        assert!(after.is_current());
        assert_eq!(after.applied.len(), before.pending.len());
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let mut conn = connect("sqlite::memory:").await.unwrap();
        migrate(&mut conn).await.unwrap();

        let err = sqlx::query("INSERT INTO slots (user_id, slot_index, listing_id) VALUES (1, 0, 1)")
            .execute(&mut conn)
            .await
            .map_err(StoreError::from)
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }
}
