//! Tradeflow Core
//!
//! This crate provides the reactive dataflow engine behind the Tradeflow
//! exchange client. It implements:
//!
//! - A named-node dependency graph with eager validation
//! - A value store with per-node generation counters
//! - An async, dependency-ordered propagation scheduler
//! - Supersede/discard bookkeeping for in-flight recomputations
//!
//! External events (form input, wallet events, chain reads) are written into
//! input nodes; derived nodes recompute asynchronously in dependency order;
//! commits notify subscribers (the DOM binding adapter, in the real client).
//! A newer write superseding an in-flight pass discards its stale results,
//! so the UI never observes a commit mixing old and new inputs.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node definitions, the registry, and graph validation
//! - `store`: current values and generation counters
//! - `engine`: the propagation driver, re-entrancy guard, and public surface
//! - `external`: seams for the chain reader, wallet events, preferences,
//!   and output binding
//!
//! # Example
//!
//! ```rust,ignore
//! use tradeflow_core::{Compute, Engine, GraphBuilder};
//! use futures_util::FutureExt;
//! use serde_json::json;
//!
//! let registry = GraphBuilder::new()
//!     .input("amount")
//!     .derived("total", ["amount"], |deps, _ctx| {
//!         let amount = deps.number("amount").unwrap_or(0.0);
//!         async move { Ok(Compute::value(amount * 1.003)) }.boxed()
//!     })
//!     .build()?;
//!
//! let engine = Engine::start(registry);
//! engine.write([("amount", json!(250.0))]).await?;
//! assert_eq!(engine.get("total")?, json!(250.75));
//! ```

pub mod engine;
pub mod error;
pub mod external;
pub mod graph;
pub mod store;

pub use engine::{Engine, PassGuard, SubscriptionId};
pub use error::{
    ComputeError, ConfigurationError, EngineError, ErrorReport, ExternalCallError, ReportKind,
};
pub use graph::{
    BoxComputeFuture, Compute, ComputeResult, DepSnapshot, GraphBuilder, NodeContext, NodeKind,
    NodeName, Registry,
};
pub use serde_json::Value;
pub use store::ValueStore;
