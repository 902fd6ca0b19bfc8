//! Persistent application storage.
//!
//! An [`AppState`] holds the three stores an application owns: global
//! key-values, per-account local key-values and boxes. The engine keeps two
//! maps of them, the *initial* baseline and the *current* state that moves
//! with the replay cursor. Program frames hold owned clones as entry
//! snapshots, so cloning is a full deep copy.

use std::collections::BTreeMap;

use avm_replay_types::{
    AppInitialState, AppStateType, ApplicationStateOperation, AvmValue, ByteArrayMap,
    StateOperation,
};

use crate::errors::{ReplayError, ReplayResult};

/// One key-value entry in a state listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub key: Vec<u8>,
    pub value: AvmValue,
}

/// Storage of one application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    global: ByteArrayMap<AvmValue>,
    local: BTreeMap<String, ByteArrayMap<AvmValue>>,
    boxes: ByteArrayMap<AvmValue>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the state reported by the simulation for one application.
    pub fn from_initial_state(initial: &AppInitialState) -> ReplayResult<Self> {
        let mut state = Self::new();
        if let Some(globals) = &initial.app_globals {
            for kv in &globals.kvs {
                state.global.set(&kv.key, kv.value.clone());
            }
        }
        for locals in &initial.app_locals {
            let account = locals.account.as_deref().ok_or_else(|| {
                ReplayError::malformed(format!(
                    "local state of app {} is missing its account",
                    initial.id
                ))
            })?;
            let store = state.local.entry(account.to_string()).or_default();
            for kv in &locals.kvs {
                store.set(&kv.key, kv.value.clone());
            }
        }
        if let Some(boxes) = &initial.app_boxes {
            for kv in &boxes.kvs {
                state.boxes.set(&kv.key, kv.value.clone());
            }
        }
        Ok(state)
    }

    /// Apply one recorded write or delete.
    pub fn apply(&mut self, op: &ApplicationStateOperation) -> ReplayResult<()> {
        let store = match op.app_state_type {
            AppStateType::Global => &mut self.global,
            AppStateType::Box => &mut self.boxes,
            AppStateType::Local => {
                let account = op.account.as_deref().ok_or_else(|| {
                    ReplayError::malformed("local state operation without an account")
                })?;
                self.local.entry(account.to_string()).or_default()
            }
        };
        match op.operation {
            StateOperation::Write => {
                let value = op.new_value.clone().ok_or_else(|| {
                    ReplayError::malformed("state write without a new value")
                })?;
                store.set(&op.key, value);
            }
            StateOperation::Delete => {
                store.delete(&op.key);
            }
        }
        Ok(())
    }

    /// Make sure `account` has a (possibly empty) local store.
    ///
    /// Returns true when the store was created.
    pub fn ensure_local_account(&mut self, account: &str) -> bool {
        if self.local.contains_key(account) {
            return false;
        }
        self.local.insert(account.to_string(), ByteArrayMap::new());
        true
    }

    /// Accounts with a local store, in address order.
    pub fn local_accounts(&self) -> Vec<&str> {
        self.local.keys().map(String::as_str).collect()
    }

    pub fn global(&self) -> &ByteArrayMap<AvmValue> {
        &self.global
    }

    pub fn local(&self, account: &str) -> Option<&ByteArrayMap<AvmValue>> {
        self.local.get(account)
    }

    pub fn boxes(&self) -> &ByteArrayMap<AvmValue> {
        &self.boxes
    }

    pub fn global_state_array(&self) -> Vec<StateEntry> {
        listing(&self.global)
    }

    pub fn local_state_array(&self, account: &str) -> ReplayResult<Vec<StateEntry>> {
        self.local
            .get(account)
            .map(listing)
            .ok_or_else(|| ReplayError::lookup(format!("no local state for account {}", account)))
    }

    pub fn box_state_array(&self) -> Vec<StateEntry> {
        listing(&self.boxes)
    }
}

fn listing(store: &ByteArrayMap<AvmValue>) -> Vec<StateEntry> {
    store
        .iter()
        .map(|(key, value)| StateEntry {
            key: key.to_vec(),
            value: value.clone(),
        })
        .collect()
}
