//! PostgreSQL store backend.
//!
//! # Schema
//! ```text
//! apps      (uuid PK, name, api_key UNIQUE, secret_key, owner_uuid, status SMALLINT)
//! app_grants(app_uuid, path, method, resource, PK(app_uuid, path, method))
//! op_logs   (id BIGSERIAL, trace_id, subject_id, caller_id, path, method,
//!            client_ip, status, code, message, params, duration_ms, created_at)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::{App, AppStatus, GatewayStore, Grant, OpLogEntry, StoreError};
use crate::config::DatabaseConfig;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS apps (
        uuid        TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        api_key     TEXT NOT NULL UNIQUE,
        secret_key  TEXT NOT NULL,
        owner_uuid  TEXT NOT NULL,
        status      SMALLINT NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS app_grants (
        app_uuid    TEXT NOT NULL REFERENCES apps(uuid),
        path        TEXT NOT NULL,
        method      TEXT NOT NULL,
        resource    TEXT,
        PRIMARY KEY (app_uuid, path, method)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS op_logs (
        id          BIGSERIAL PRIMARY KEY,
        trace_id    TEXT NOT NULL,
        subject_id  TEXT,
        caller_id   TEXT,
        path        TEXT NOT NULL,
        method      TEXT NOT NULL,
        client_ip   TEXT,
        status      INTEGER NOT NULL,
        code        INTEGER NOT NULL,
        message     TEXT NOT NULL,
        params      TEXT NOT NULL,
        duration_ms BIGINT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL
    )"#,
];

const APP_COLUMNS: &str = "uuid, name, api_key, secret_key, owner_uuid, status";

/// Store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool using the configured url and limits.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the gateway tables when absent.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn app_from_row(row: &PgRow) -> Result<App, StoreError> {
        Ok(App {
            uuid: row.try_get("uuid")?,
            name: row.try_get("name")?,
            api_key: row.try_get("api_key")?,
            secret_key: row.try_get("secret_key")?,
            owner_uuid: row.try_get("owner_uuid")?,
            status: AppStatus::from_i16(row.try_get("status")?),
        })
    }
}

#[async_trait]
impl GatewayStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find_app_by_uuid(&self, uuid: &str) -> Result<Option<App>, StoreError> {
        let query = format!("SELECT {} FROM apps WHERE uuid = $1", APP_COLUMNS);
        let row = sqlx::query(&query)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::app_from_row).transpose()
    }

    async fn find_app_by_api_key(&self, api_key: &str) -> Result<Option<App>, StoreError> {
        let query = format!("SELECT {} FROM apps WHERE api_key = $1", APP_COLUMNS);
        let row = sqlx::query(&query)
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::app_from_row).transpose()
    }

    async fn find_grant(
        &self,
        app_uuid: &str,
        path: &str,
        method: &str,
    ) -> Result<Option<Grant>, StoreError> {
        let row = sqlx::query(
            "SELECT app_uuid, path, method, resource FROM app_grants \
             WHERE app_uuid = $1 AND path = $2 AND method = $3",
        )
        .bind(app_uuid)
        .bind(path)
        .bind(method)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Grant {
                app_uuid: row.try_get("app_uuid")?,
                path: row.try_get("path")?,
                method: row.try_get("method")?,
                resource: row.try_get("resource")?,
            })),
            None => Ok(None),
        }
    }

    async fn replace_grants(&self, app_uuid: &str, grants: Vec<Grant>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM apps WHERE uuid = $1")
            .bind(app_uuid)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("app {}", app_uuid)));
        }

        sqlx::query("DELETE FROM app_grants WHERE app_uuid = $1")
            .bind(app_uuid)
            .execute(&mut *tx)
            .await?;

        for grant in &grants {
            sqlx::query(
                "INSERT INTO app_grants (app_uuid, path, method, resource) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (app_uuid, path, method) DO UPDATE SET resource = EXCLUDED.resource",
            )
            .bind(app_uuid)
            .bind(&grant.path)
            .bind(&grant.method)
            .bind(&grant.resource)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_op_log(&self, entry: OpLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO op_logs (trace_id, subject_id, caller_id, path, method, client_ip, \
             status, code, message, params, duration_ms, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&entry.trace_id)
        .bind(&entry.subject_id)
        .bind(&entry.caller_id)
        .bind(&entry.path)
        .bind(&entry.method)
        .bind(&entry.client_ip)
        .bind(i32::from(entry.status))
        .bind(i32::from(entry.code))
        .bind(&entry.message)
        .bind(&entry.params)
        .bind(entry.duration_ms)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
