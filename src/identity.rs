//! Device identity
//!
//! Each installation carries one pseudo-identifier of the form
//! `AMP-XXXX-XXXX-XXXX`. It is derived once from environment signals,
//! persisted, and reused for the life of the installation:
//! 1. Serialize the signals as one JSON object
//! 2. Fold the UTF-16 code units with `h = h * 31 + unit` (wrapping `i32`)
//! 3. Render `|h|` as upper-case hex, zero-padded to 12 digits
//! 4. Split into three groups of four behind the `AMP` prefix
//!
//! The identifier is a fingerprint for manual operator whitelisting, not a
//! credential. Collisions are possible and accepted.

use std::fmt;
use std::str::FromStr;

use log::{info, warn};
use serde::{Serialize, Serializer};

use crate::error::StorageError;
use crate::signals::{EnvironmentSignals, SignalSource};
use crate::storage::{KeyValueStore, DEVICE_ID_KEY};

pub const DEVICE_ID_PREFIX: &str = "AMP";

const GROUP_LEN: usize = 4;

/// A validated device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Parse a stored or operator-supplied identifier. Strict: no trimming,
    /// no case folding.
    pub fn parse(raw: &str) -> Option<Self> {
        is_valid_device_id(raw).then(|| Self(raw.to_string()))
    }

    /// Derive the identifier for a set of environment signals.
    pub fn from_signals(signals: &EnvironmentSignals) -> Self {
        let input = serde_json::to_string(signals).unwrap_or_else(|_| format!("{signals:?}"));
        Self::from_hash(fingerprint_hash(&input))
    }

    fn from_hash(hash: i32) -> Self {
        // |i32::MIN| fits in 8 hex digits, so the padded form is always 12
        let hex = format!("{:012X}", hash.unsigned_abs());
        Self(format!(
            "{DEVICE_ID_PREFIX}-{}-{}-{}",
            &hex[..GROUP_LEN],
            &hex[GROUP_LEN..2 * GROUP_LEN],
            &hex[2 * GROUP_LEN..]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceId {
    type Err = InvalidDeviceId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidDeviceId(s.to_string()))
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a device id: {0:?}")]
pub struct InvalidDeviceId(pub String);

/// Strict format check: `^AMP-[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{4}$`.
pub fn is_valid_device_id(id: &str) -> bool {
    let Some(rest) = id
        .strip_prefix(DEVICE_ID_PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };
    let groups: Vec<&str> = rest.split('-').collect();
    groups.len() == 3
        && groups.iter().all(|group| {
            group.len() == GROUP_LEN
                && group
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        })
}

/// Rolling 31-multiplier hash over UTF-16 code units, wrapping at 32 bits.
pub fn fingerprint_hash(input: &str) -> i32 {
    input.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_mul(31).wrapping_add(i32::from(unit))
    })
}

/// How the identifier for this run was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// Read back from storage.
    Existing(DeviceId),
    /// First run: generated and persisted.
    Created(DeviceId),
    /// Stored value failed validation; discarded and replaced. The caller
    /// must restart its cycle rather than continue with the old value.
    Regenerated { discarded: String, id: DeviceId },
}

impl IdentityOutcome {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::Existing(id) | Self::Created(id) | Self::Regenerated { id, .. } => id,
        }
    }

    pub fn into_device_id(self) -> DeviceId {
        match self {
            Self::Existing(id) | Self::Created(id) | Self::Regenerated { id, .. } => id,
        }
    }
}

/// Reads, generates and persists the device identifier.
pub struct DeviceIdentityProvider<S, E> {
    store: S,
    signals: E,
}

impl<S, E> DeviceIdentityProvider<S, E>
where
    S: KeyValueStore,
    E: SignalSource,
{
    pub fn new(store: S, signals: E) -> Self {
        Self { store, signals }
    }

    /// Return the persisted identifier, creating it on first use.
    ///
    /// Storage is written only when no valid identifier exists yet.
    pub fn get_or_create(&self) -> Result<IdentityOutcome, StorageError> {
        match self.store.get(DEVICE_ID_KEY)? {
            Some(raw) => match DeviceId::parse(&raw) {
                Some(id) => Ok(IdentityOutcome::Existing(id)),
                None => {
                    warn!("Invalid device id {raw:?} in storage, regenerating");
                    self.store.remove(DEVICE_ID_KEY)?;
                    let id = self.create()?;
                    Ok(IdentityOutcome::Regenerated { discarded: raw, id })
                }
            },
            None => Ok(IdentityOutcome::Created(self.create()?)),
        }
    }

    /// Compute the identifier for the current environment without touching
    /// storage.
    pub fn generate(&self) -> DeviceId {
        DeviceId::from_signals(&self.signals.collect())
    }

    fn create(&self) -> Result<DeviceId, StorageError> {
        let id = self.generate();
        self.store.set(DEVICE_ID_KEY, id.as_str())?;
        info!("Generated device id {id}");
        Ok(id)
    }
}
