// meater-core: Polling loop between meater-api and the host state tree.

pub mod config;
pub mod error;
pub mod poller;
pub mod session;
pub mod status;
pub mod sync;
pub mod tree;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::PollerConfig;
pub use error::CoreError;
pub use poller::{Poller, PollerHandle};
pub use session::{Credentials, Session};
pub use status::{Action, BACKOFF_SECS, Classification, classify};
pub use sync::{SyncOutcome, SyncSettings, provision_device, reconcile};
pub use tree::{
    MemoryTree, NodeKind, NodeSpec, StateTree, StoredValue, TreeError, ValueType, WriteOptions,
};
