//! Persistent store subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline stages (read-only):
//!     signature / api_key → find_app_by_uuid / find_app_by_api_key
//!     permission          → find_grant(app, path, method)
//! audit wrapper           → record_op_log
//! admin grant assignment  → replace_grants (transactional)
//! ```
//!
//! # Design Decisions
//! - One async trait so stages depend on behavior, not on a backend
//! - Memory backend for tests and database-less development
//! - PostgreSQL backend via sqlx with parameterized queries only

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Error type for store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Lifecycle status of a registered caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Disabled,
    Enabled,
    Deleted,
}

impl AppStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            AppStatus::Disabled => 0,
            AppStatus::Enabled => 1,
            AppStatus::Deleted => 2,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => AppStatus::Enabled,
            2 => AppStatus::Deleted,
            _ => AppStatus::Disabled,
        }
    }
}

/// A registered API client ("app").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub uuid: String,
    pub name: String,
    pub api_key: String,
    /// HMAC signing secret. Never serialized back to clients.
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub owner_uuid: String,
    pub status: AppStatus,
}

impl App {
    pub fn is_enabled(&self) -> bool {
        self.status == AppStatus::Enabled
    }
}

/// Permission for one caller to invoke one (path, method) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub app_uuid: String,
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub resource: Option<String>,
}

impl Grant {
    pub fn new(app_uuid: impl Into<String>, path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            app_uuid: app_uuid.into(),
            path: path.into(),
            method: method.into(),
            resource: None,
        }
    }

    pub fn matches(&self, app_uuid: &str, path: &str, method: &str) -> bool {
        self.app_uuid == app_uuid && self.path == path && self.method == method
    }
}

/// One row of the operation (audit) log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpLogEntry {
    pub trace_id: String,
    pub subject_id: Option<String>,
    pub caller_id: Option<String>,
    pub path: String,
    pub method: String,
    pub client_ip: Option<String>,
    pub status: u16,
    pub code: u16,
    pub message: String,
    pub params: String,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Read/write access used by the gateway.
#[async_trait]
pub trait GatewayStore: Send + Sync {
    /// Short backend name for status reporting.
    fn backend(&self) -> &'static str;

    async fn find_app_by_uuid(&self, uuid: &str) -> Result<Option<App>, StoreError>;

    async fn find_app_by_api_key(&self, api_key: &str) -> Result<Option<App>, StoreError>;

    /// Exact-match grant lookup.
    async fn find_grant(
        &self,
        app_uuid: &str,
        path: &str,
        method: &str,
    ) -> Result<Option<Grant>, StoreError>;

    /// Replace every grant of `app_uuid` with `grants` atomically.
    async fn replace_grants(&self, app_uuid: &str, grants: Vec<Grant>) -> Result<(), StoreError>;

    async fn record_op_log(&self, entry: OpLogEntry) -> Result<(), StoreError>;
}
