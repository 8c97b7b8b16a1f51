//! Node types for the dataflow graph.
//!
//! A node is a named unit of reactive state. Input nodes are written by
//! external events (form fields, wallet events, timers) and are never
//! recomputed. Derived nodes own an async compute function and an explicit,
//! statically declared list of dependency names fixed at registration time.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use smallvec::SmallVec;

use crate::error::ComputeError;

/// Name of a node in the graph. Cheap to clone, compares by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeName(Arc<str>);

impl NodeName {
    /// View the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for NodeName {
    fn from(name: String) -> Self {
        Self(Arc::from(name.as_str()))
    }
}

impl Borrow<str> for NodeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Set only by external events or side writes, never recomputed.
    Input,

    /// Owns a compute function and a fixed dependency list.
    Derived,
}

/// Outcome of a compute function.
///
/// `Unchanged` is a deliberate sentinel distinct from committing `Null`:
/// a node may elect not to touch its stored value at all, while `Null` is a
/// perfectly valid committed value (it renders as "(unknown)" downstream).
#[derive(Debug, Clone, PartialEq)]
pub enum Compute {
    /// Commit this value (subject to the store's equal-value short-circuit).
    Value(Value),

    /// Leave the stored value alone.
    Unchanged,
}

impl Compute {
    /// Commit any JSON-convertible value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

/// Result type returned by compute functions.
pub type ComputeResult = Result<Compute, ComputeError>;

/// Type-erased async compute function.
pub type BoxComputeFuture = BoxFuture<'static, ComputeResult>;

/// A derived node's compute function: receives an owned snapshot of its
/// declared dependencies plus a context for side writes.
pub type ComputeFn = Arc<dyn Fn(DepSnapshot, NodeContext) -> BoxComputeFuture + Send + Sync>;

/// Dependency list for a derived node. Most nodes have a handful of inputs.
pub type DepList = SmallVec<[NodeName; 4]>;

/// Immutable snapshot of a node's dependency values, captured the moment the
/// node became ready to run. A compute function never observes values from
/// two different passes mixed together.
#[derive(Debug, Clone, Default)]
pub struct DepSnapshot {
    values: IndexMap<NodeName, Value>,
}

impl DepSnapshot {
    pub(crate) fn new(values: IndexMap<NodeName, Value>) -> Self {
        Self { values }
    }

    /// Borrow a dependency's value, if the name was declared.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Clone a dependency's value, `Null` for undeclared names.
    pub fn value(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Dependency as an `f64`, if present and numeric.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    /// Dependency as a string slice, if present and a string.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Dependency as a bool, if present and boolean.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    /// Number of captured dependencies.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Per-invocation context handed to a compute function.
///
/// Its only capability is the side write: a store into another *input* node,
/// harvested atomically with the function's own result. Side writes from a
/// superseded invocation are discarded along with the result.
#[derive(Clone, Default)]
pub struct NodeContext {
    side_writes: Arc<Mutex<Vec<(NodeName, Value)>>>,
}

impl NodeContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stage a write into another input node, applied as the start of the
    /// next batch once the current pass finishes.
    pub fn side_write(&self, name: impl Into<NodeName>, value: Value) {
        self.side_writes.lock().push((name.into(), value));
    }

    pub(crate) fn take_side_writes(&self) -> Vec<(NodeName, Value)> {
        std::mem::take(&mut *self.side_writes.lock())
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("staged_side_writes", &self.side_writes.lock().len())
            .finish()
    }
}

/// Definition of a node held by the registry.
pub(crate) enum NodeDef {
    Input,
    Derived { deps: DepList, compute: ComputeFn },
}

impl NodeDef {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            NodeDef::Input => NodeKind::Input,
            NodeDef::Derived { .. } => NodeKind::Derived,
        }
    }
}
