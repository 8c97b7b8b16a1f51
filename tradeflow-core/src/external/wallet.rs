//! Wallet provider events.
//!
//! The wallet modal and its provider adapters live outside the core. What
//! crosses the boundary is a small event vocabulary, mapped here onto input
//! nodes (`wallet`, `chain_id`, `provider`) and funneled through the same
//! batched write path as every other mutation.

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::warn;

use crate::engine::Engine;
use crate::graph::NodeName;

/// Input node holding the active account address (`Null` when disconnected).
pub const WALLET_NODE: &str = "wallet";
/// Input node holding the current chain id.
pub const CHAIN_ID_NODE: &str = "chain_id";
/// Input node holding whether a provider is connected.
pub const PROVIDER_NODE: &str = "provider";

/// Events emitted by the wallet provider adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletEvent {
    /// The selected accounts changed; the first account becomes active.
    AccountsChanged { accounts: Vec<String> },
    /// The provider switched chains.
    ChainChanged { chain_id: u64 },
    /// A provider connected on the given chain.
    Connect { chain_id: u64 },
    /// The provider disconnected.
    Disconnect,
}

/// Input-node writes corresponding to a wallet event.
pub fn wallet_writes(event: &WalletEvent) -> Vec<(NodeName, Value)> {
    match event {
        WalletEvent::AccountsChanged { accounts } => {
            let active = accounts
                .first()
                .map(|account| json!(account))
                .unwrap_or(Value::Null);
            vec![(NodeName::from(WALLET_NODE), active)]
        }
        WalletEvent::ChainChanged { chain_id } => {
            vec![(NodeName::from(CHAIN_ID_NODE), json!(chain_id))]
        }
        WalletEvent::Connect { chain_id } => vec![
            (NodeName::from(PROVIDER_NODE), json!(true)),
            (NodeName::from(CHAIN_ID_NODE), json!(chain_id)),
        ],
        WalletEvent::Disconnect => vec![
            (NodeName::from(PROVIDER_NODE), json!(false)),
            (NodeName::from(WALLET_NODE), Value::Null),
        ],
    }
}

/// Pump wallet events into the engine until the event source closes.
pub async fn drive_wallet_events(engine: Engine, mut events: mpsc::UnboundedReceiver<WalletEvent>) {
    while let Some(event) = events.recv().await {
        let writes = wallet_writes(&event);
        if let Err(error) = engine.write(writes).await {
            warn!(%error, "wallet event write failed; stopping event pump");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use serde_json::json;

    #[test]
    fn accounts_changed_selects_the_first_account() {
        let writes = wallet_writes(&WalletEvent::AccountsChanged {
            accounts: vec!["0xabc".to_string(), "0xdef".to_string()],
        });
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0.as_str(), WALLET_NODE);
        assert_eq!(writes[0].1, json!("0xabc"));
    }

    #[test]
    fn empty_accounts_clear_the_wallet() {
        let writes = wallet_writes(&WalletEvent::AccountsChanged { accounts: vec![] });
        assert_eq!(writes[0].1, Value::Null);
    }

    #[test]
    fn disconnect_clears_provider_and_wallet() {
        let writes = wallet_writes(&WalletEvent::Disconnect);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].1, json!(false));
        assert_eq!(writes[1].1, Value::Null);
    }

    #[tokio::test]
    async fn events_flow_into_input_nodes() {
        let registry = GraphBuilder::new()
            .input(WALLET_NODE)
            .input(CHAIN_ID_NODE)
            .input(PROVIDER_NODE)
            .build()
            .unwrap();
        let engine = Engine::start(registry);

        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(drive_wallet_events(engine.clone(), rx));

        tx.send(WalletEvent::Connect { chain_id: 1 }).unwrap();
        tx.send(WalletEvent::AccountsChanged {
            accounts: vec!["0xabc".to_string()],
        })
        .unwrap();
        drop(tx);

        // The pump exits once both events have been written and committed.
        pump.await.unwrap();

        assert_eq!(engine.get(PROVIDER_NODE).unwrap(), json!(true));
        assert_eq!(engine.get(CHAIN_ID_NODE).unwrap(), json!(1));
        assert_eq!(engine.get(WALLET_NODE).unwrap(), json!("0xabc"));
    }
}
