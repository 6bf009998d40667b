//! Offline authorization cache
//!
//! Holds the last snapshot that came back from a successful remote fetch,
//! whether it allowed this device or not. A revoked device that goes offline
//! therefore stays revoked.
//!
//! The cache is written only by the live path. Evaluating a cached snapshot
//! never writes it back, so staleness cannot refresh itself. Entries are never
//! expired.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::policy::{PolicyRecord, PolicySnapshot};
use crate::storage::{KeyValueStore, CACHED_AUTHORIZATION_KEY, LAST_CHECK_KEY};

/// Persisted shape of `cached-authorization`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedAuthorization {
    records: Vec<PolicyRecord>,
    timestamp: DateTime<Utc>,
    /// Informational; the mode is recomputed from `records` on load.
    open_mode: bool,
}

pub struct AuthorizationCache<S> {
    store: S,
}

impl<S: KeyValueStore> AuthorizationCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist `snapshot`, replacing whatever was cached before.
    pub fn save(&self, snapshot: &PolicySnapshot) -> Result<(), StorageError> {
        let cached = CachedAuthorization {
            records: snapshot.records().to_vec(),
            timestamp: snapshot.fetched_at(),
            open_mode: snapshot.open_mode(),
        };
        self.store
            .set(CACHED_AUTHORIZATION_KEY, &serde_json::to_string(&cached)?)?;
        self.store.set(LAST_CHECK_KEY, &Utc::now().to_rfc3339())?;
        debug!("Cached {} policy records", cached.records.len());
        Ok(())
    }

    /// The last saved snapshot. Missing, unreadable and corrupt all read as
    /// `None`.
    pub fn load(&self) -> Option<PolicySnapshot> {
        let raw = match self.store.get(CACHED_AUTHORIZATION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("Cached authorization unreadable: {err}");
                return None;
            }
        };
        match serde_json::from_str::<CachedAuthorization>(&raw) {
            Ok(cached) => Some(PolicySnapshot::new(cached.records, cached.timestamp)),
            Err(err) => {
                warn!("Cached authorization corrupt, ignoring: {err}");
                None
            }
        }
    }

    /// When the cache was last refreshed from a live fetch.
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get(LAST_CHECK_KEY).ok()??;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }

    /// Forget the cached authorization so the next launch must go live.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(CACHED_AUTHORIZATION_KEY)?;
        self.store.remove(LAST_CHECK_KEY)
    }
}
