//! Value Store
//!
//! Current value and generation counter for every node in the graph. The
//! store is the engine's only shared mutable state and follows a single-
//! writer discipline: only the driver task ever calls [`ValueStore::apply`];
//! everything else reads through the lock.
//!
//! The generation counter increments only when a node's stored value is
//! actually replaced. Writing a value deep-equal to the current one is a
//! no-op: no generation bump, no dependent recomputation. Callers that need
//! to force re-evaluation on an unchanged value go through an explicit
//! clear-then-set sequence; that is their concern, not the store's.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::graph::{DepSnapshot, NodeName, Registry};

struct Entry {
    value: Value,
    generation: u64,
}

/// Per-node `(value, generation)` pairs for the whole graph.
pub struct ValueStore {
    entries: RwLock<IndexMap<NodeName, Entry>>,
}

impl ValueStore {
    /// Seed an entry for every registered node. Unwritten nodes read as
    /// `Null` at generation zero.
    pub fn new(registry: &Registry) -> Self {
        let entries = registry
            .names()
            .map(|name| {
                (
                    name.clone(),
                    Entry {
                        value: Value::Null,
                        generation: 0,
                    },
                )
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Current value of a node, `None` for names outside the graph.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.read().get(name).map(|entry| entry.value.clone())
    }

    /// Generation counter of a node.
    pub fn generation(&self, name: &str) -> Option<u64> {
        self.entries.read().get(name).map(|entry| entry.generation)
    }

    /// Full immutable snapshot of every node's current value.
    pub fn snapshot(&self) -> IndexMap<NodeName, Value> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value.clone()))
            .collect()
    }

    /// Whether a candidate value deep-equals the stored one.
    pub(crate) fn equals(&self, name: &str, value: &Value) -> bool {
        self.entries
            .read()
            .get(name)
            .map(|entry| entry.value == *value)
            .unwrap_or(false)
    }

    /// Replace a node's value. Returns `false` (and leaves the generation
    /// alone) when the new value deep-equals the stored one.
    pub(crate) fn apply(&self, name: &NodeName, value: Value) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(name.as_str()) {
            Some(entry) => {
                if entry.value == value {
                    return false;
                }
                entry.value = value;
                entry.generation += 1;
                true
            }
            None => false,
        }
    }

    /// Owned snapshot of the named dependencies, taken atomically.
    pub(crate) fn capture(&self, deps: &[NodeName]) -> DepSnapshot {
        let entries = self.entries.read();
        let values = deps
            .iter()
            .map(|name| {
                let value = entries
                    .get(name.as_str())
                    .map(|entry| entry.value.clone())
                    .unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();
        DepSnapshot::new(values)
    }
}
