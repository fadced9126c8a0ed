//! In-memory store backend.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{App, GatewayStore, Grant, OpLogEntry, StoreError};

/// Op logs kept before the oldest entries are dropped.
pub const DEFAULT_OP_LOG_CAPACITY: usize = 10_000;

#[derive(Default)]
struct Tables {
    apps: HashMap<String, App>,
    grants: Vec<Grant>,
    op_logs: VecDeque<OpLogEntry>,
}

/// Store backed by process memory.
///
/// Op logs live in a ring buffer: once `op_log_capacity` entries are held,
/// each new entry evicts the oldest one.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    op_log_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_op_log_capacity(DEFAULT_OP_LOG_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_op_log_capacity(capacity: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            op_log_capacity: capacity.max(1),
        }
    }

    /// Register or overwrite an app.
    pub fn insert_app(&self, app: App) {
        self.tables.write().apps.insert(app.uuid.clone(), app);
    }

    pub fn insert_grant(&self, grant: Grant) {
        self.tables.write().grants.push(grant);
    }

    /// Grants currently held by `app_uuid`.
    pub fn grants_for(&self, app_uuid: &str) -> Vec<Grant> {
        self.tables
            .read()
            .grants
            .iter()
            .filter(|g| g.app_uuid == app_uuid)
            .cloned()
            .collect()
    }

    /// Retained op logs, oldest first.
    pub fn op_logs(&self) -> Vec<OpLogEntry> {
        self.tables.read().op_logs.iter().cloned().collect()
    }
}

#[async_trait]
impl GatewayStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_app_by_uuid(&self, uuid: &str) -> Result<Option<App>, StoreError> {
        Ok(self.tables.read().apps.get(uuid).cloned())
    }

    async fn find_app_by_api_key(&self, api_key: &str) -> Result<Option<App>, StoreError> {
        Ok(self
            .tables
            .read()
            .apps
            .values()
            .find(|app| app.api_key == api_key)
            .cloned())
    }

    async fn find_grant(
        &self,
        app_uuid: &str,
        path: &str,
        method: &str,
    ) -> Result<Option<Grant>, StoreError> {
        Ok(self
            .tables
            .read()
            .grants
            .iter()
            .find(|g| g.matches(app_uuid, path, method))
            .cloned())
    }

    async fn replace_grants(&self, app_uuid: &str, grants: Vec<Grant>) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.apps.contains_key(app_uuid) {
            return Err(StoreError::NotFound(format!("app {}", app_uuid)));
        }
        tables.grants.retain(|g| g.app_uuid != app_uuid);
        tables.grants.extend(grants.into_iter().map(|mut g| {
            g.app_uuid = app_uuid.to_string();
            g
        }));
        Ok(())
    }

    async fn record_op_log(&self, entry: OpLogEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.op_logs.len() >= self.op_log_capacity {
            tables.op_logs.pop_front();
        }
        tables.op_logs.push_back(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AppStatus;

    fn app(uuid: &str, key: &str) -> App {
        App {
            uuid: uuid.into(),
            name: uuid.into(),
            api_key: key.into(),
            secret_key: "secret".into(),
            owner_uuid: "owner".into(),
            status: AppStatus::Enabled,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_key_and_uuid() {
        let store = MemoryStore::new();
        store.insert_app(app("a1", "key-1"));

        assert_eq!(store.find_app_by_api_key("key-1").await.unwrap().unwrap().uuid, "a1");
        assert!(store.find_app_by_api_key("key-2").await.unwrap().is_none());
        assert!(store.find_app_by_uuid("a1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_grants_swaps_whole_set() {
        let store = MemoryStore::new();
        store.insert_app(app("a1", "k1"));
        store.insert_app(app("a2", "k2"));
        store.insert_grant(Grant::new("a1", "/old", "GET"));
        store.insert_grant(Grant::new("a2", "/keep", "GET"));

        store
            .replace_grants("a1", vec![Grant::new("ignored", "/new", "POST")])
            .await
            .unwrap();

        assert_eq!(store.grants_for("a1"), vec![Grant::new("a1", "/new", "POST")]);
        assert_eq!(store.grants_for("a2").len(), 1);
        assert!(store.find_grant("a1", "/old", "GET").await.unwrap().is_none());
    }

    fn op_log(trace_id: &str) -> OpLogEntry {
        OpLogEntry {
            trace_id: trace_id.into(),
            subject_id: None,
            caller_id: None,
            path: "/api/v1/orders".into(),
            method: "POST".into(),
            client_ip: None,
            status: 200,
            code: 200,
            message: "OK".into(),
            params: String::new(),
            duration_ms: 1,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_op_logs_evict_oldest_past_capacity() {
        let store = MemoryStore::with_op_log_capacity(3);
        for i in 0..5 {
            store.record_op_log(op_log(&format!("t{}", i))).await.unwrap();
        }

        let traces: Vec<_> = store.op_logs().into_iter().map(|e| e.trace_id).collect();
        assert_eq!(traces, vec!["t2", "t3", "t4"]);
    }

    #[tokio::test]
    async fn test_replace_grants_unknown_app() {
        let store = MemoryStore::new();
        let err = store.replace_grants("ghost", vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
