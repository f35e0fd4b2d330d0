use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{DockhandError, Result};
use crate::fleet::machine::{Machine, MachineSnapshot};

/// Thread-safe mapping from configured address to machine.
///
/// The only state shared across tasks. Guarded by one reader/writer lock:
/// many readers, or one writer, never both. Readers never observe a
/// partially populated map; a reload clears first and repopulates, so an
/// empty listing during that window is a valid transient state.
#[derive(Default)]
pub struct Registry {
    machines: RwLock<HashMap<String, Arc<Machine>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a machine by its configured address.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::UnknownMachine`] when no machine is
    /// registered under `address`.
    pub fn get(&self, address: &str) -> Result<Arc<Machine>> {
        self.read()
            .get(address)
            .cloned()
            .ok_or_else(|| DockhandError::UnknownMachine {
                address: address.to_string(),
            })
    }

    /// Register a machine under its configured address. Concurrent probes
    /// each insert their own key; a re-insert replaces the entry wholesale.
    pub fn insert(&self, machine: Arc<Machine>) {
        self.write()
            .insert(machine.address().to_string(), machine);
    }

    /// Remove every machine; the first step of a fleet rebuild.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Point-in-time copies of all machines, ordered by address.
    #[must_use]
    pub fn snapshots(&self) -> Vec<MachineSnapshot> {
        let mut list: Vec<MachineSnapshot> =
            self.read().values().map(|m| m.snapshot()).collect();
        list.sort_by(|a, b| a.address.cmp(&b.address));
        list
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Machine>>> {
        self.machines
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Machine>>> {
        self.machines
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
