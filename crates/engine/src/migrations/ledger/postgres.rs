use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::BTreeSet;

use super::VersionLedger;
use crate::error::{MigrateError, MigrateResult};
use crate::migrations::version::Version;
use migshift_core::config::{ConfigValidator, IdentifierValidator};

/// Ledger stored in a Postgres table with one row per applied version
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
    table: String,
}

impl PgLedger {
    /// Wrap a pool. The table name is interpolated into SQL and must be a
    /// plain identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        IdentifierValidator::new("migrations_table").validate(table.as_str())?;
        Ok(Self { pool, table })
    }

    /// Connect to `database_url` and use `table` as the ledger
    pub async fn connect(database_url: &str, table: impl Into<String>) -> MigrateResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| MigrateError::ledger_read(format!("Failed to connect to database: {}", e)))?;
        Self::new(pool, table)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                version BIGINT PRIMARY KEY,\n    \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()\n\
            );",
            self.table
        )
    }

    /// SQL to list applied versions
    pub fn select_versions_sql(&self) -> String {
        format!("SELECT version FROM {} ORDER BY version", self.table)
    }

    /// SQL to record a version
    pub fn insert_sql(&self) -> String {
        format!("INSERT INTO {} (version) VALUES ($1)", self.table)
    }

    /// SQL to remove a version
    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE version = $1", self.table)
    }

    /// Record `version` inside a caller-owned transaction
    pub(crate) async fn insert_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        version: Version,
    ) -> MigrateResult<()> {
        sqlx::query(&self.insert_sql())
            .bind(version.get())
            .execute(&mut **tx)
            .await
            .map_err(|e| MigrateError::ledger_write(format!("Failed to record {}: {}", version, e)))?;
        Ok(())
    }

    /// Remove `version` inside a caller-owned transaction, returning the
    /// number of rows deleted
    pub(crate) async fn delete_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        version: Version,
    ) -> MigrateResult<u64> {
        let result = sqlx::query(&self.delete_sql())
            .bind(version.get())
            .execute(&mut **tx)
            .await
            .map_err(|e| MigrateError::ledger_write(format!("Failed to remove {}: {}", version, e)))?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> MigrateResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| MigrateError::ledger_write(format!("Failed to start transaction: {}", e)))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> MigrateResult<()> {
        tx.commit()
            .await
            .map_err(|e| MigrateError::ledger_write(format!("Failed to commit ledger change: {}", e)))
    }
}

#[async_trait]
impl VersionLedger for PgLedger {
    async fn ensure_storage(&self) -> MigrateResult<()> {
        sqlx::query(&self.create_table_sql())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MigrateError::ledger_write(format!("Failed to create migrations table: {}", e))
            })?;
        Ok(())
    }

    async fn applied_versions(&self) -> MigrateResult<BTreeSet<Version>> {
        let rows = sqlx::query(&self.select_versions_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::ledger_read(format!("Failed to query applied migrations: {}", e)))?;

        let mut versions = BTreeSet::new();
        for row in rows {
            let version: i64 = row
                .try_get("version")
                .map_err(|e| MigrateError::ledger_read(format!("Failed to get version: {}", e)))?;
            versions.insert(Version::new(version));
        }
        Ok(versions)
    }

    async fn insert(&self, version: Version) -> MigrateResult<()> {
        let mut tx = self.begin().await?;
        self.insert_in(&mut tx, version).await?;
        Self::commit(tx).await
    }

    async fn remove(&self, version: Version) -> MigrateResult<()> {
        let mut tx = self.begin().await?;
        self.delete_in(&mut tx, version).await?;
        Self::commit(tx).await
    }

    async fn swap(&self, old: Version, new: Version) -> MigrateResult<()> {
        let mut tx = self.begin().await?;

        // Dropping the transaction without commit rolls it back
        if self.delete_in(&mut tx, old).await? != 1 {
            return Err(MigrateError::ledger_write(format!(
                "cannot move {} to {}: {} is not recorded",
                old, new, old
            )));
        }
        self.insert_in(&mut tx, new).await?;

        Self::commit(tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        // Never connects: only SQL generation is exercised here
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/migshift_test")
            .unwrap()
    }

    #[tokio::test]
    async fn test_ledger_sql_generation() {
        let ledger = PgLedger::new(lazy_pool(), "schema_migrations").unwrap();

        let create_sql = ledger.create_table_sql();
        assert!(create_sql.contains("CREATE TABLE IF NOT EXISTS schema_migrations"));
        assert!(create_sql.contains("version BIGINT PRIMARY KEY"));

        assert_eq!(
            ledger.select_versions_sql(),
            "SELECT version FROM schema_migrations ORDER BY version"
        );
        assert!(ledger.insert_sql().contains("INSERT INTO schema_migrations (version)"));
        assert!(ledger.delete_sql().contains("WHERE version = $1"));
    }

    #[tokio::test]
    async fn test_rejects_unsafe_table_names() {
        assert!(PgLedger::new(lazy_pool(), "x; DROP TABLE users").is_err());
    }
}
