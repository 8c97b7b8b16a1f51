//! Commit-notification subscriptions.
//!
//! Callbacks registered per node, invoked on the driver task whenever a pass
//! commits a changed value for that node. This is the seam the DOM binding
//! adapter hangs off.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::graph::NodeName;

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Per-node callback registry.
pub(crate) struct Subscriptions {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<NodeName, Vec<(SubscriptionId, Callback)>>>,
}

impl Subscriptions {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn add<F>(&self, node: NodeName, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .lock()
            .entry(node)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) {
        let mut callbacks = self.callbacks.lock();
        for list in callbacks.values_mut() {
            list.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    /// Invoke every callback registered for `node`.
    ///
    /// The matching callbacks are snapshotted and the lock released before
    /// dispatch, so a callback may re-enter `add`/`remove` without wedging
    /// the driver task. Callbacks added during dispatch see the next commit,
    /// not this one.
    pub(crate) fn notify(&self, node: &NodeName, value: &Value) {
        let snapshot: Vec<Callback> = {
            let callbacks = self.callbacks.lock();
            match callbacks.get(node) {
                Some(list) => list.iter().map(|(_, callback)| callback.clone()).collect(),
                None => return,
            }
        };
        for callback in snapshot {
            callback(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicI32;
    use std::sync::Arc;

    #[test]
    fn notify_reaches_only_the_named_node() {
        let subs = Subscriptions::new();
        let hits = Arc::new(AtomicI32::new(0));

        let hits_clone = hits.clone();
        subs.add(NodeName::from("price"), move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        subs.notify(&NodeName::from("price"), &json!(1));
        subs.notify(&NodeName::from("other"), &json!(2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_may_reenter_the_registry() {
        let subs = Arc::new(Subscriptions::new());
        let hits = Arc::new(AtomicI32::new(0));

        let subs_clone = subs.clone();
        let hits_clone = hits.clone();
        subs.add(NodeName::from("price"), move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
            // Register and immediately drop a sibling from inside dispatch.
            let id = subs_clone.add(NodeName::from("price"), |_| {});
            subs_clone.remove(id);
        });

        subs.notify(&NodeName::from("price"), &json!(1));
        subs.notify(&NodeName::from("price"), &json!(2));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removed_subscriptions_stop_firing() {
        let subs = Subscriptions::new();
        let hits = Arc::new(AtomicI32::new(0));

        let hits_clone = hits.clone();
        let id = subs.add(NodeName::from("price"), move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        subs.notify(&NodeName::from("price"), &json!(1));
        subs.remove(id);
        subs.notify(&NodeName::from("price"), &json!(2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
