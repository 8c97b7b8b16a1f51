//! Output binding adapter seam.
//!
//! The real DOM adapter lives outside the core; what it needs from us is a
//! render callback per output node and a rendering convention: unavailable
//! values show an explicit "(unknown)" placeholder rather than blank text or
//! an exception.

use std::sync::Arc;

use serde_json::Value;

use crate::engine::{Engine, SubscriptionId};
use crate::error::EngineError;

/// Where rendered output lands (a DOM element, a test buffer, a terminal).
pub trait OutputSink: Send + Sync {
    fn render(&self, node: &str, text: &str);
}

/// Display form of a committed value. `Null` is the "unknown" placeholder.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => "(unknown)".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Render a node's current value into the sink now and on every commit.
///
/// The subscription is registered before the initial read, so a commit
/// landing in between is not lost; at worst the same value renders twice.
pub fn bind_output(
    engine: &Engine,
    node: &str,
    sink: Arc<dyn OutputSink>,
) -> Result<SubscriptionId, EngineError> {
    let name = node.to_string();
    let commit_sink = sink.clone();
    let id = engine.subscribe(node, move |value| {
        commit_sink.render(&name, &display_text(value));
    })?;

    let current = engine.get(node)?;
    sink.render(node, &display_text(&current));
    Ok(id)
}
