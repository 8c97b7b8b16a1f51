//! Propagation Driver
//!
//! The driver is the engine's single logical writer. It owns the loop that
//! turns batched input writes into propagation passes:
//!
//! 1. Assemble a batch: queued side writes first, then every write request
//!    immediately available on the channel, coalesced last-write-wins per
//!    field.
//! 2. Apply the input assignments through the store; deep-equal values are
//!    no-ops. An empty effective change set produces no pass at all.
//! 3. Compute the affected closure once from the static graph and process it
//!    in dependency order: a node starts only when none of its closure
//!    dependencies remain unresolved, and every ready node runs concurrently
//!    as a spawned task tagged with the pass generation.
//! 4. On each resolution, commit through the generation check. Side writes
//!    from current results queue up as the start of the next batch.
//! 5. The pass commits once every closure node has resolved; subscribers of
//!    changed nodes are notified and write acknowledgements resolve.
//!
//! A new external write arriving mid-pass supersedes it: the generation
//! advances, in-flight computations keep running but their late results are
//! discarded, and a fresh pass immediately covers the union of the new
//! change set and the old pass's unresolved closure. Acknowledgements of the
//! superseded writes carry over and resolve when the replacement commits, so
//! no committed state ever reflects the older writes alone.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use super::guard::PassGuard;
use super::subscriptions::Subscriptions;
use crate::error::{ComputeError, ErrorReport, ReportKind};
use crate::graph::{Compute, ComputeResult, NodeContext, NodeKind, NodeName, Registry};
use crate::store::ValueStore;

pub(crate) type Ack = oneshot::Sender<()>;

/// A batched input-node write, acknowledged at pass commit.
pub(crate) struct WriteRequest {
    pub(crate) changes: IndexMap<NodeName, Value>,
    pub(crate) ack: Ack,
}

/// A finished node computation, tagged with its pass generation.
struct Resolution {
    generation: u64,
    node: NodeName,
    outcome: ComputeResult,
    side_writes: Vec<(NodeName, Value)>,
}

/// The engine's driver task.
pub(crate) struct Driver {
    shared: Shared,
    requests: mpsc::UnboundedReceiver<WriteRequest>,
    results: mpsc::UnboundedReceiver<Resolution>,
}

struct Shared {
    registry: Arc<Registry>,
    store: Arc<ValueStore>,
    guard: Arc<PassGuard>,
    subs: Arc<Subscriptions>,
    errors: broadcast::Sender<ErrorReport>,
    results_tx: mpsc::UnboundedSender<Resolution>,
}

impl Driver {
    pub(crate) fn new(
        registry: Arc<Registry>,
        store: Arc<ValueStore>,
        guard: Arc<PassGuard>,
        subs: Arc<Subscriptions>,
        errors: broadcast::Sender<ErrorReport>,
        requests: mpsc::UnboundedReceiver<WriteRequest>,
    ) -> Self {
        let (results_tx, results) = mpsc::unbounded_channel();
        Self {
            shared: Shared {
                registry,
                store,
                guard,
                subs,
                errors,
                results_tx,
            },
            requests,
            results,
        }
    }

    pub(crate) async fn run(self) {
        let Driver {
            shared,
            mut requests,
            mut results,
        } = self;

        // Side writes harvested from the previous pass; they start the next
        // batch. Settle waiters resolve only once everything has drained.
        let mut side_queue: IndexMap<NodeName, Value> = IndexMap::new();
        let mut settles: Vec<Ack> = Vec::new();
        let mut closed = false;

        loop {
            let mut batch = std::mem::take(&mut side_queue);
            let mut acks: Vec<Ack> = Vec::new();

            while let Ok(request) = requests.try_recv() {
                absorb(request, &mut batch, &mut acks, &mut settles);
            }

            while batch.is_empty() {
                for settle in settles.drain(..) {
                    let _ = settle.send(());
                }
                tokio::select! {
                    request = requests.recv() => {
                        match request {
                            Some(request) => {
                                absorb(request, &mut batch, &mut acks, &mut settles);
                                while let Ok(request) = requests.try_recv() {
                                    absorb(request, &mut batch, &mut acks, &mut settles);
                                }
                            }
                            None => {
                                debug!("write channel closed; driver stopping");
                                return;
                            }
                        }
                    }
                    resolution = results.recv() => {
                        // Late arrivals from a pass that already committed or
                        // was superseded.
                        if let Some(resolution) = resolution {
                            shared.report_stale(&resolution);
                        }
                    }
                }
            }

            shared
                .run_pass(
                    &mut requests,
                    &mut results,
                    &mut side_queue,
                    &mut settles,
                    &mut closed,
                    batch,
                    acks,
                )
                .await;
        }
    }
}

impl Shared {
    /// Run one propagation pass to commit, restarting internally whenever a
    /// superseding external write arrives.
    #[allow(clippy::too_many_arguments)]
    async fn run_pass(
        &self,
        requests: &mut mpsc::UnboundedReceiver<WriteRequest>,
        results: &mut mpsc::UnboundedReceiver<Resolution>,
        side_queue: &mut IndexMap<NodeName, Value>,
        settles: &mut Vec<Ack>,
        closed: &mut bool,
        mut batch: IndexMap<NodeName, Value>,
        mut acks: Vec<Ack>,
    ) {
        // Unresolved nodes of a superseded pass, carried into its replacement.
        let mut carryover: Vec<NodeName> = Vec::new();
        // Every node whose stored value this pass (or a superseded ancestor)
        // replaced; notified once, with the final value, at commit.
        let mut changed: Vec<NodeName> = Vec::new();

        'pass: loop {
            let mut seeds: Vec<NodeName> = Vec::new();
            for (name, value) in std::mem::take(&mut batch) {
                if self.store.apply(&name, value) {
                    if !changed.contains(&name) {
                        changed.push(name.clone());
                    }
                    seeds.push(name);
                }
            }
            seeds.append(&mut carryover);

            let closure = self.registry.affected(&seeds);
            if closure.is_empty() {
                self.finish(&changed, &mut acks);
                return;
            }

            let generation = self.guard.begin_pass();
            debug!(generation, nodes = closure.len(), "pass computing");

            let mut unresolved: HashSet<NodeName> = closure.iter().cloned().collect();
            let mut started: HashSet<NodeName> = HashSet::new();

            self.start_ready(generation, &closure, &unresolved, &mut started);

            while !unresolved.is_empty() {
                tokio::select! {
                    biased;

                    request = requests.recv(), if !*closed => {
                        match request {
                            Some(request) => {
                                let mut incoming: IndexMap<NodeName, Value> = IndexMap::new();
                                absorb(request, &mut incoming, &mut acks, settles);
                                while let Ok(request) = requests.try_recv() {
                                    absorb(request, &mut incoming, &mut acks, settles);
                                }
                                // Equal-valued writes never trigger anything,
                                // so they never supersede anything either.
                                incoming.retain(|name, value| !self.store.equals(name.as_str(), value));
                                if !incoming.is_empty() {
                                    debug!(generation, "pass superseded by external write");
                                    batch = incoming;
                                    carryover = unresolved.into_iter().collect();
                                    continue 'pass;
                                }
                            }
                            None => *closed = true,
                        }
                    }

                    resolution = results.recv() => {
                        // The sender half lives in `self`, so the channel
                        // cannot close while the driver runs.
                        let Some(resolution) = resolution else { return };
                        if !self.guard.is_current(resolution.generation)
                            || !unresolved.contains(&resolution.node)
                        {
                            self.report_stale(&resolution);
                            continue;
                        }
                        self.commit(resolution, &mut changed, side_queue, &mut unresolved);
                        self.start_ready(generation, &closure, &unresolved, &mut started);
                    }
                }
            }

            debug!(generation, changed = changed.len(), "pass committed");
            self.finish(&changed, &mut acks);
            return;
        }
    }

    /// Notify subscribers of every changed node and resolve the batch acks.
    fn finish(&self, changed: &[NodeName], acks: &mut Vec<Ack>) {
        for name in changed {
            if let Some(value) = self.store.get(name.as_str()) {
                self.subs.notify(name, &value);
            }
        }
        for ack in acks.drain(..) {
            let _ = ack.send(());
        }
    }

    /// Spawn every closure node whose dependencies have all resolved.
    fn start_ready(
        &self,
        generation: u64,
        closure: &[NodeName],
        unresolved: &HashSet<NodeName>,
        started: &mut HashSet<NodeName>,
    ) {
        for name in closure {
            if !unresolved.contains(name) || started.contains(name) {
                continue;
            }
            let deps = self.registry.dependencies(name.as_str());
            if deps.iter().any(|dep| unresolved.contains(dep)) {
                continue;
            }
            let Some(compute) = self.registry.compute(name.as_str()) else {
                continue;
            };
            started.insert(name.clone());

            // The snapshot is taken at ready time: all of this node's
            // dependencies have committed within this pass already.
            let snapshot = self.store.capture(deps);
            let ctx = NodeContext::new();
            let future = (compute)(snapshot, ctx.clone());
            let tx = self.results_tx.clone();
            let node = name.clone();
            tokio::spawn(async move {
                let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ComputeError::Panicked),
                };
                let side_writes = ctx.take_side_writes();
                let _ = tx.send(Resolution {
                    generation,
                    node,
                    outcome,
                    side_writes,
                });
            });
        }
    }

    /// Commit a current-generation resolution and harvest its side writes.
    fn commit(
        &self,
        resolution: Resolution,
        changed: &mut Vec<NodeName>,
        side_queue: &mut IndexMap<NodeName, Value>,
        unresolved: &mut HashSet<NodeName>,
    ) {
        let Resolution {
            node,
            outcome,
            side_writes,
            ..
        } = resolution;

        match outcome {
            Ok(Compute::Value(value)) => {
                if self.store.apply(&node, value) && !changed.contains(&node) {
                    changed.push(node.clone());
                }
            }
            Ok(Compute::Unchanged) => {}
            Err(error) => {
                warn!(node = %node, %error, "compute failed; previous value retained");
                self.report(&node, ReportKind::ComputeFailed, error.to_string());
            }
        }

        for (target, value) in side_writes {
            match self.registry.kind(target.as_str()) {
                Some(NodeKind::Input) => {
                    side_queue.insert(target, value);
                }
                _ => warn!(
                    source = %node,
                    target = %target,
                    "side write ignored: target is not an input node"
                ),
            }
        }

        unresolved.remove(&node);
    }

    fn report(&self, node: &NodeName, kind: ReportKind, message: String) {
        let _ = self.errors.send(ErrorReport {
            node: node.clone(),
            kind,
            message,
        });
    }

    fn report_stale(&self, resolution: &Resolution) {
        debug!(
            node = %resolution.node,
            generation = resolution.generation,
            "stale result discarded"
        );
        self.report(
            &resolution.node,
            ReportKind::StaleResultDiscarded,
            "superseded before commit".to_string(),
        );
    }
}

/// Fold a write request into the batch being assembled. Empty requests are
/// settle probes: they resolve once the engine has fully drained.
fn absorb(
    request: WriteRequest,
    batch: &mut IndexMap<NodeName, Value>,
    acks: &mut Vec<Ack>,
    settles: &mut Vec<Ack>,
) {
    if request.changes.is_empty() {
        settles.push(request.ack);
    } else {
        for (name, value) in request.changes {
            batch.insert(name, value);
        }
        acks.push(request.ack);
    }
}
