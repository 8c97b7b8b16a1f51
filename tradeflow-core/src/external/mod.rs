//! External collaborators.
//!
//! Everything the core consumes or feeds but does not own: the chain RPC
//! surface, wallet provider events, persisted preferences, and the output
//! binding adapter. Each is a trait seam with the policy the core promises
//! (retry/backoff/timeout, best-effort degradation, placeholder rendering)
//! implemented on this side of the boundary.

mod bind;
mod chain;
mod prefs;
mod wallet;

pub use bind::{bind_output, display_text, OutputSink};
pub use chain::{ChainClient, ChainReader, RetryPolicy};
pub use prefs::{MemoryPrefs, PreferenceError, PreferenceStore, Preferences};
pub use wallet::{
    drive_wallet_events, wallet_writes, WalletEvent, CHAIN_ID_NODE, PROVIDER_NODE, WALLET_NODE,
};
