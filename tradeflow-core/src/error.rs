//! Error types for the dataflow engine.
//!
//! The taxonomy follows the failure model of the engine:
//!
//! - [`ConfigurationError`]: the graph definition itself is bad. Fatal, and
//!   raised eagerly at registration so a misconfigured graph fails at startup
//!   instead of stalling silently at runtime.
//! - [`ComputeError`]: a single node's compute function failed. The node keeps
//!   its previous value and the failure is reported on the engine's error
//!   channel; sibling nodes in the same pass are unaffected.
//! - [`EngineError`]: API misuse (writing to an unknown or derived node) or a
//!   request against an engine that has already shut down.
//! - [`ExternalCallError`]: a chain/price call failed after exhausting its
//!   retry budget. Nodes observe this as an "unknown" (`Null`) value rather
//!   than an error.

use thiserror::Error;

use crate::graph::NodeName;

/// A fatal problem with the graph definition, detected at registration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The same node name was defined more than once.
    #[error("node `{0}` is defined more than once")]
    DuplicateNode(NodeName),

    /// A derived node declared a dependency that no node defines.
    #[error("node `{node}` depends on `{dependency}`, which is not defined")]
    UnknownDependency {
        node: NodeName,
        dependency: NodeName,
    },

    /// The derived nodes contain a dependency cycle.
    #[error("dependency cycle involving nodes: {0:?}")]
    DependencyCycle(Vec<NodeName>),
}

/// A single node's compute function failed.
///
/// The scheduler treats a failed node as "unchanged": its stored value is
/// retained and its dependents still run against the previous value.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// A domain-specific failure raised by the compute function itself.
    #[error("{0}")]
    Message(String),

    /// The compute function panicked. Isolated so the pass keeps going.
    #[error("compute function panicked")]
    Panicked,

    /// An external call failed even after retries and the node chose to
    /// propagate that instead of substituting an "unknown" value.
    #[error(transparent)]
    External(#[from] ExternalCallError),
}

impl ComputeError {
    /// Convenience constructor for ad hoc failures inside compute functions.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Misuse of the engine's public surface, or a dead engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The named node does not exist in the registered graph.
    #[error("unknown node `{0}`")]
    UnknownNode(NodeName),

    /// External writes may only target input nodes.
    #[error("node `{0}` is derived and cannot be written externally")]
    NotAnInput(NodeName),

    /// The engine's driver task has stopped.
    #[error("engine has shut down")]
    Closed,
}

/// Failure of a retried external call (chain read, price feed, wallet RPC).
#[derive(Debug, Error)]
pub enum ExternalCallError {
    /// The underlying call returned an error.
    #[error("call `{method}` failed: {reason}")]
    Failed { method: String, reason: String },

    /// A single attempt exceeded the per-call timeout.
    #[error("call `{method}` timed out")]
    Timeout { method: String },

    /// Every attempt failed; the retry budget is spent.
    #[error("call `{method}` still failing after {attempts} attempts")]
    Exhausted { method: String, attempts: u32 },
}

/// What an [`ErrorReport`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// A node's compute function failed; its previous value was retained.
    ComputeFailed,

    /// A superseded pass's late result was dropped before commit.
    ///
    /// Not a user-visible error. Reported for observability only.
    StaleResultDiscarded,
}

/// An entry on the engine's process-wide error channel.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// The node the report concerns.
    pub node: NodeName,
    /// Classification of the report.
    pub kind: ReportKind,
    /// Human-readable detail.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_name_the_offender() {
        let err = ConfigurationError::DuplicateNode(NodeName::from("price"));
        assert!(err.to_string().contains("price"));

        let err = ConfigurationError::UnknownDependency {
            node: NodeName::from("quote"),
            dependency: NodeName::from("pool"),
        };
        let text = err.to_string();
        assert!(text.contains("quote"));
        assert!(text.contains("pool"));
    }

    #[test]
    fn external_error_converts_into_compute_error() {
        let external = ExternalCallError::Exhausted {
            method: "eth_call".to_string(),
            attempts: 3,
        };
        let compute: ComputeError = external.into();
        assert!(compute.to_string().contains("eth_call"));
    }
}
