//! Dataflow Graph
//!
//! This module defines the static dependency graph of the engine: named
//! nodes (input or derived), their declared dependency lists, and the
//! registry that validates the whole definition once at startup.
//!
//! # Design Decisions
//!
//! 1. Dependency lists are declared explicitly at registration. There is no
//!    runtime reflection over compute function signatures; a node's inputs
//!    are fixed for the life of the session.
//!
//! 2. Validation is eager. Unknown dependencies, duplicate names, and cycles
//!    fail at [`GraphBuilder::build`], never at first evaluation.
//!
//! 3. The registry precomputes both forward (dependencies) and reverse
//!    (dependents) edges plus a global topological order, so each propagation
//!    pass computes its affected closure in one traversal.

mod node;
mod registry;

pub use node::{
    BoxComputeFuture, Compute, ComputeFn, ComputeResult, DepList, DepSnapshot, NodeContext,
    NodeKind, NodeName,
};
pub use registry::{GraphBuilder, Registry};
