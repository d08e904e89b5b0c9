//! At-most-once announcement of signals within a TTL window.

pub mod fingerprint;
pub mod gate;
pub mod store;

pub use fingerprint::{fingerprint, fingerprint_input, KEY_PREFIX};
pub use gate::DedupGate;
pub use store::{DedupStore, MemoryDedupStore, RedisDedupStore};
