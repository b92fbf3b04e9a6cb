//! Table and subject registries.

use crate::error::RuntimeError;
use crate::machine::Machine;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fsmkit_core::{InstanceInfo, Table};
use std::sync::Arc;

/// Frozen tables keyed by class id.
#[derive(Default)]
pub struct TableRegistry {
    tables: DashMap<String, Arc<Table>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freezes and registers a table. A class id may be registered once.
    pub fn register(&self, table: Table) -> Result<Arc<Table>, RuntimeError> {
        match self.tables.entry(table.class_id().to_string()) {
            Entry::Occupied(entry) => Err(RuntimeError::TableExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let table = Arc::new(table);
                entry.insert(table.clone());
                tracing::debug!(
                    "registered table {} ({} states, {} events)",
                    table.class_id(),
                    table.state_count(),
                    table.events().len()
                );
                Ok(table)
            }
        }
    }

    pub fn get(&self, class_id: &str) -> Option<Arc<Table>> {
        self.tables.get(class_id).map(|t| t.value().clone())
    }

    /// Returns registered class ids, sorted.
    pub fn class_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Live subjects keyed by `CLASS:name`.
#[derive(Default)]
pub struct SubjectRegistry {
    subjects: DashMap<String, Arc<Machine>>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, machine: Arc<Machine>) -> Result<(), RuntimeError> {
        match self.subjects.entry(machine.key().to_string()) {
            Entry::Occupied(entry) => Err(RuntimeError::SubjectExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(machine);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Machine>> {
        self.subjects.get(key).map(|m| m.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.subjects.contains_key(key)
    }

    /// Removes `machine`, leaving any other subject since registered under
    /// the same key in place.
    pub(crate) fn remove(&self, machine: &Machine) -> Option<Arc<Machine>> {
        let removed = self
            .subjects
            .remove_if(machine.key(), |_, live| std::ptr::eq(Arc::as_ptr(live), machine))
            .map(|(_, m)| m);
        if removed.is_some() {
            tracing::debug!("{}: removed from registry", machine.key());
        }
        removed
    }

    /// Describes the subjects of one class, sorted by key.
    pub fn list(&self, class_id: &str) -> Vec<InstanceInfo> {
        let mut infos: Vec<InstanceInfo> = self
            .machines()
            .into_iter()
            .filter(|m| m.class_id() == class_id)
            .map(|m| m.info())
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Snapshot of all live subjects.
    pub fn machines(&self) -> Vec<Arc<Machine>> {
        self.subjects.iter().map(|m| m.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}
