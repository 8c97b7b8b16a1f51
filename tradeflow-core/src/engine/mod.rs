//! Dataflow Engine
//!
//! The engine ties the registry, value store, propagation driver, and guard
//! together behind a small async surface:
//!
//! - [`Engine::write`] stages a batch of input assignments and resolves at
//!   the commit of the pass that carries them;
//! - [`Engine::get`] reads any node's current value synchronously;
//! - [`Engine::subscribe`] delivers commit notifications per node;
//! - [`Engine::error_reports`] exposes the process-wide error channel.
//!
//! The driver runs as a spawned task and is the store's only writer; every
//! mutation, including wallet events and side writes, funnels through the
//! same batched write path.

mod driver;
mod guard;
mod subscriptions;

pub use guard::PassGuard;
pub use subscriptions::SubscriptionId;

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{EngineError, ErrorReport};
use crate::graph::{NodeKind, NodeName, Registry};
use crate::store::ValueStore;
use driver::{Driver, WriteRequest};
use subscriptions::Subscriptions;

/// Capacity of the error-report broadcast channel. Reports are advisory;
/// slow receivers lag rather than block the driver.
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Handle to a running dataflow engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    store: Arc<ValueStore>,
    guard: Arc<PassGuard>,
    subs: Arc<Subscriptions>,
    errors: broadcast::Sender<ErrorReport>,
    requests: mpsc::UnboundedSender<WriteRequest>,
}

impl Engine {
    /// Start the engine over a validated graph, spawning the driver task.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(registry: Registry) -> Self {
        let registry = Arc::new(registry);
        let store = Arc::new(ValueStore::new(&registry));
        let guard = Arc::new(PassGuard::new());
        let subs = Arc::new(Subscriptions::new());
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        let (requests, requests_rx) = mpsc::unbounded_channel();

        let driver = Driver::new(
            registry.clone(),
            store.clone(),
            guard.clone(),
            subs.clone(),
            errors.clone(),
            requests_rx,
        );
        tokio::spawn(driver.run());

        Self {
            registry,
            store,
            guard,
            subs,
            errors,
            requests,
        }
    }

    /// Stage a batch of input-node assignments.
    ///
    /// The returned future resolves once the propagation pass carrying these
    /// changes has committed (including a superseding pass, if a later write
    /// arrived mid-flight). Writing to an unknown or derived node fails
    /// before anything is enqueued.
    pub async fn write<I, N>(&self, changes: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = (N, Value)>,
        N: Into<NodeName>,
    {
        let mut batch: IndexMap<NodeName, Value> = IndexMap::new();
        for (name, value) in changes {
            let name = name.into();
            match self.registry.kind(name.as_str()) {
                Some(NodeKind::Input) => {
                    batch.insert(name, value);
                }
                Some(NodeKind::Derived) => return Err(EngineError::NotAnInput(name)),
                None => return Err(EngineError::UnknownNode(name)),
            }
        }
        self.send(batch).await
    }

    /// Convenience for a single-field write.
    pub async fn write_one(
        &self,
        name: impl Into<NodeName>,
        value: Value,
    ) -> Result<(), EngineError> {
        self.write([(name.into(), value)]).await
    }

    /// Resolve once every queued batch, including pending side writes, has
    /// drained. The observation hook for side effects and tests.
    pub async fn settle(&self) -> Result<(), EngineError> {
        self.send(IndexMap::new()).await
    }

    async fn send(&self, changes: IndexMap<NodeName, Value>) -> Result<(), EngineError> {
        let (ack, done) = oneshot::channel();
        self.requests
            .send(WriteRequest { changes, ack })
            .map_err(|_| EngineError::Closed)?;
        done.await.map_err(|_| EngineError::Closed)
    }

    /// Current value of a node. Synchronous; never suspends.
    pub fn get(&self, name: &str) -> Result<Value, EngineError> {
        self.store
            .get(name)
            .ok_or_else(|| EngineError::UnknownNode(NodeName::from(name)))
    }

    /// Generation counter of a node.
    pub fn generation(&self, name: &str) -> Result<u64, EngineError> {
        self.store
            .generation(name)
            .ok_or_else(|| EngineError::UnknownNode(NodeName::from(name)))
    }

    /// Full immutable snapshot of every node's current value.
    pub fn snapshot(&self) -> IndexMap<NodeName, Value> {
        self.store.snapshot()
    }

    /// Register a commit callback for a node. The callback runs on the
    /// driver task with the freshly committed value.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> Result<SubscriptionId, EngineError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        if !self.registry.contains(name) {
            return Err(EngineError::UnknownNode(NodeName::from(name)));
        }
        Ok(self.subs.add(NodeName::from(name), callback))
    }

    /// Remove a previously registered commit callback.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subs.remove(id);
    }

    /// Subscribe to the process-wide error channel (compute failures and
    /// stale-result discards).
    pub fn error_reports(&self) -> broadcast::Receiver<ErrorReport> {
        self.errors.subscribe()
    }

    /// Spawn a background task tracked by the guard (e.g. transaction
    /// submission). Tracked tasks can be awaited via
    /// [`Engine::await_background`].
    pub fn spawn_tracked<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.guard.track(future);
    }

    /// Await every tracked background task spawned so far.
    pub async fn await_background(&self) {
        self.guard.await_background().await;
    }

    /// The graph this engine runs.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
