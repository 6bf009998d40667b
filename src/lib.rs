//! ampact-gate - launch-time authorization for the AMPACT Selector client
//!
//! Before any application feature starts, the gate decides whether this
//! installation may run at all:
//! 1. Derive (once) and reuse a device identifier
//! 2. Fetch the operator's access-control table
//! 3. Evaluate it: master switch open, or per-device whitelist
//! 4. Cache the table for offline launches
//! 5. On deny, tear down the offline copy and show a lockout screen
//!
//! The gate never fails outward. A network failure falls back to the cached
//! table, and with no cache the gate fails open.

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod identity;
pub mod lockout;
pub mod policy;
pub mod signals;
pub mod storage;

pub use cache::AuthorizationCache;
pub use config::GateConfig;
pub use error::{FetchError, GateError, StorageError};
pub use gate::{AuthorizationContext, AuthorizationDecision, DecisionSource, Gate};
pub use identity::{is_valid_device_id, DeviceId, DeviceIdentityProvider, IdentityOutcome};
pub use lockout::{LockoutPresenter, MessageConfig};
pub use policy::{
    evaluate, PolicyMode, PolicyRecord, PolicySnapshot, PolicySource, PolicyStoreClient,
    MASTER_SWITCH_ID,
};
pub use signals::{EnvironmentSignals, HostSignals, SignalSource};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
