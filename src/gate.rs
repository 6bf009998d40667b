//! Launch-time authorization gate
//!
//! Runs once, before any application feature initializes, and always ends
//! in a decision:
//!
//! 1. Resolve the device id (restarting once if a corrupt id was replaced)
//! 2. Fetch the policy table
//!    - ok: evaluate, cache the snapshot, source `live`
//!    - failed: evaluate the cached snapshot, source `cache`
//!    - failed, nothing cached: allow, source `fail-open`
//!
//! Nothing here returns an error to the caller. Failures along the way are
//! recovered and recorded on the [`AuthorizationContext`].
//!
//! # Fail-open
//!
//! A device that has never reached the policy table and has no cache is
//! admitted. Once any fetch has succeeded, an offline launch is decided by
//! the cached table instead, so a revoked device stays locked out.

use std::fmt;

use log::{error, info, warn};
use serde::Serialize;

use crate::cache::AuthorizationCache;
use crate::error::GateError;
use crate::identity::{DeviceId, DeviceIdentityProvider, IdentityOutcome};
use crate::policy::{evaluate, PolicyMode, PolicySource};
use crate::signals::SignalSource;
use crate::storage::KeyValueStore;

/// Identity passes before giving up on storage and using a computed id
const MAX_IDENTITY_PASSES: usize = 2;

/// Where a decision's supporting data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionSource {
    Live,
    Cache,
    FailOpen,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Cache => write!(f, "cache"),
            Self::FailOpen => write!(f, "fail-open"),
        }
    }
}

/// Outcome of one gate run. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub source: DecisionSource,
    /// Mode of the evaluated snapshot; `None` when nothing was evaluated.
    pub mode: Option<PolicyMode>,
}

impl AuthorizationDecision {
    pub fn fail_open() -> Self {
        Self {
            allowed: true,
            source: DecisionSource::FailOpen,
            mode: None,
        }
    }
}

/// Everything one gate run produced, passed on to whoever acts on it.
#[derive(Debug)]
pub struct AuthorizationContext {
    pub device_id: DeviceId,
    pub decision: AuthorizationDecision,
    /// Failures recovered on the way to the decision, in order.
    pub recovered: Vec<GateError>,
}

pub struct Gate<P, S, E> {
    source: P,
    store: S,
    signals: E,
}

impl<P, S, E> Gate<P, S, E>
where
    P: PolicySource,
    S: KeyValueStore,
    E: SignalSource,
{
    pub fn new(source: P, store: S, signals: E) -> Self {
        Self {
            source,
            store,
            signals,
        }
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decide whether this device may run.
    pub fn authorize(&self) -> AuthorizationDecision {
        self.check().decision
    }

    /// Decide whether this device may run, keeping the full context.
    pub fn check(&self) -> AuthorizationContext {
        let mut recovered = Vec::new();
        let device_id = self.resolve_device_id(&mut recovered);
        let cache = AuthorizationCache::new(&self.store);

        let decision = match self.source.fetch_snapshot() {
            Ok(snapshot) => {
                let evaluation = evaluate(&snapshot, &device_id);
                if let Err(err) = cache.save(&snapshot) {
                    warn!("Could not cache policy snapshot: {err}");
                    recovered.push(err.into());
                }
                evaluation.tagged(DecisionSource::Live)
            }
            Err(err) => {
                error!("Policy check failed: {err}");
                recovered.push(err.into());
                match cache.load() {
                    Some(cached) => {
                        warn!(
                            "Using cached access control from {}",
                            cached.fetched_at().to_rfc3339()
                        );
                        evaluate(&cached, &device_id).tagged(DecisionSource::Cache)
                    }
                    None => {
                        warn!("No cached access control, failing open");
                        recovered.push(GateError::NoCacheAvailable);
                        AuthorizationDecision::fail_open()
                    }
                }
            }
        };

        if decision.allowed {
            info!("Access granted for {device_id} ({})", decision.source);
        } else {
            info!("Access denied for {device_id} ({})", decision.source);
        }

        AuthorizationContext {
            device_id,
            decision,
            recovered,
        }
    }

    fn resolve_device_id(&self, recovered: &mut Vec<GateError>) -> DeviceId {
        let provider = DeviceIdentityProvider::new(&self.store, &self.signals);
        for _ in 0..MAX_IDENTITY_PASSES {
            match provider.get_or_create() {
                Ok(IdentityOutcome::Regenerated { discarded, id }) => {
                    // Start over with the replacement as a fresh first run
                    recovered.push(GateError::InvalidIdentity {
                        discarded,
                        replacement: id,
                    });
                }
                Ok(outcome) => return outcome.into_device_id(),
                Err(err) => {
                    warn!("Device id storage unavailable, using computed id: {err}");
                    recovered.push(err.into());
                    return provider.generate();
                }
            }
        }
        provider.generate()
    }
}
