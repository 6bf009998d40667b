//! Policy evaluation
//!
//! Pure: no I/O, no state carried between calls. The master switch is
//! checked before any whitelist logic and short-circuits it entirely.

use log::debug;

use crate::gate::{AuthorizationDecision, DecisionSource};
use crate::identity::DeviceId;
use crate::policy::{PolicyMode, PolicySnapshot};

/// Result of evaluating one snapshot for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub mode: PolicyMode,
    pub allowed: bool,
}

impl Evaluation {
    /// Attach the provenance of the snapshot that produced this evaluation.
    pub fn tagged(self, source: DecisionSource) -> AuthorizationDecision {
        AuthorizationDecision {
            allowed: self.allowed,
            source,
            mode: Some(self.mode),
        }
    }
}

/// Decide whether `device_id` may run under `snapshot`.
pub fn evaluate(snapshot: &PolicySnapshot, device_id: &DeviceId) -> Evaluation {
    if snapshot.open_mode() {
        debug!("Master switch active, open mode");
        return Evaluation {
            mode: PolicyMode::Open,
            allowed: true,
        };
    }

    let whitelist = snapshot.whitelist();
    let allowed = whitelist.contains(&device_id.as_str().to_uppercase());
    debug!(
        "Whitelist mode: {} active ids, {device_id} {}",
        whitelist.len(),
        if allowed { "granted" } else { "denied" }
    );
    Evaluation {
        mode: PolicyMode::Whitelist,
        allowed,
    }
}
