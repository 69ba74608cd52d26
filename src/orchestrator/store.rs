//! Project role store boundary
//!
//! After a completed set or remove on a project directory, the orchestrator
//! reports the roles found on disk so the project database can be kept in
//! line with the filer. The database client lives outside this crate.

use crate::acl::role::RoleMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

pub trait ProjectRoleStore: Send + Sync {
    /// Record the roles currently on disk for `project_id`
    fn record(&self, project_id: &str, roles: &RoleMap) -> anyhow::Result<()>;
}

/// Writes each record to the log as structured fields
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRoleStore;

impl ProjectRoleStore for LogRoleStore {
    fn record(&self, project_id: &str, roles: &RoleMap) -> anyhow::Result<()> {
        let roles = serde_json::to_string(roles)?;
        info!(project = project_id, roles = %roles, "Project roles on disk");
        Ok(())
    }
}

/// Keeps the latest record per project
#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    records: Mutex<HashMap<String, RoleMap>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project_id: &str) -> Option<RoleMap> {
        self.records.lock().get(project_id).cloned()
    }
}

impl ProjectRoleStore for MemoryRoleStore {
    fn record(&self, project_id: &str, roles: &RoleMap) -> anyhow::Result<()> {
        self.records
            .lock()
            .insert(project_id.to_string(), roles.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::role::{Principal, Role};

    #[test]
    fn test_memory_store_keeps_latest() {
        let store = MemoryRoleStore::new();
        let first = RoleMap::single(Role::Viewer, [Principal::user("carol")]);
        let second = RoleMap::single(Role::Manager, [Principal::user("carol")]);

        store.record("3010000.01", &first).unwrap();
        store.record("3010000.01", &second).unwrap();
        assert_eq!(store.get("3010000.01"), Some(second));
        assert!(store.get("3010000.02").is_none());
    }

    #[test]
    fn test_log_store_accepts_records() {
        let roles = RoleMap::single(Role::Writer, [Principal::group("lab")]);
        assert!(LogRoleStore.record("3010000.01", &roles).is_ok());
    }
}
