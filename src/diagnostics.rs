//! Operator diagnostics
//!
//! Helpers for whoever administers the policy table: see what the table
//! currently says, check whether this device would be admitted, and drop the
//! offline cache after editing the table.
//!
//! The launcher binary does not expose these. An embedding application (an
//! admin screen, a debug console) calls them against the same data
//! directory the gate uses:
//!
//! ```no_run
//! use ampact_gate::diagnostics::{clear_cache, validate_policy};
//! use ampact_gate::{
//!     DeviceIdentityProvider, FileStore, GateConfig, HostSignals, PolicyStoreClient,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = GateConfig::from_env();
//!     let store = FileStore::in_dir(&config.data_dir);
//!     let device_id = DeviceIdentityProvider::new(&store, HostSignals::new())
//!         .get_or_create()?
//!         .into_device_id();
//!
//!     let report = validate_policy(&PolicyStoreClient::new(&config), &device_id)?;
//!     println!("{report}");
//!
//!     // After editing the table, force the next launch to go live
//!     clear_cache(&store)?;
//!     Ok(())
//! }
//! ```

use std::fmt;

use crate::cache::AuthorizationCache;
use crate::error::{FetchError, StorageError};
use crate::identity::{is_valid_device_id, DeviceId};
use crate::policy::{evaluate, PolicyMode, PolicyRecord, PolicySnapshot, PolicySource};
use crate::storage::KeyValueStore;

const UNKNOWN_NAME: &str = "Unknown";

/// One non-master row of the table, as an operator sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub access_id: String,
    pub name: String,
    /// Whether `access_id` is a well-formed device id as written.
    pub format_valid: bool,
    pub device: Option<String>,
    pub notes: Option<String>,
}

impl From<&PolicyRecord> for PolicyEntry {
    fn from(record: &PolicyRecord) -> Self {
        Self {
            access_id: record.access_id.clone(),
            name: record
                .name
                .clone()
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            format_valid: is_valid_device_id(&record.access_id),
            device: record.device.clone().filter(|d| !d.is_empty()),
            notes: record.notes.clone().filter(|n| !n.is_empty()),
        }
    }
}

/// What a policy snapshot means for the operator and for this device.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyReport {
    pub record_count: usize,
    /// Status of the master switch row, if the table has one.
    pub master_switch: Option<String>,
    pub mode: PolicyMode,
    pub active: Vec<PolicyEntry>,
    pub revoked: Vec<PolicyEntry>,
    pub device_id: DeviceId,
    pub allowed: bool,
}

impl PolicyReport {
    pub fn build(snapshot: &PolicySnapshot, device_id: &DeviceId) -> Self {
        let entries = || {
            snapshot
                .records()
                .iter()
                .filter(|record| !record.is_master_switch())
        };
        let evaluation = evaluate(snapshot, device_id);
        Self {
            record_count: snapshot.records().len(),
            master_switch: snapshot.master_switch().map(|record| record.status.clone()),
            mode: evaluation.mode,
            active: entries()
                .filter(|record| record.is_active())
                .map(PolicyEntry::from)
                .collect(),
            revoked: entries()
                .filter(|record| record.is_revoked())
                .map(PolicyEntry::from)
                .collect(),
            device_id: device_id.clone(),
            allowed: evaluation.allowed,
        }
    }
}

impl fmt::Display for PolicyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total records: {}", self.record_count)?;
        match (&self.master_switch, self.mode) {
            (Some(_), PolicyMode::Open) => {
                writeln!(f, "Master switch: OPEN MODE - all users allowed")?;
            }
            (Some(status), PolicyMode::Whitelist) => {
                writeln!(
                    f,
                    "Master switch: WHITELIST MODE - only approved users (status {status:?})"
                )?;
            }
            (None, _) => {
                writeln!(f, "No master switch found, whitelist mode")?;
                writeln!(
                    f,
                    "Add a record with Access ID = \"SYSTEM-CONTROL\" to enable the master switch"
                )?;
            }
        }

        writeln!(f, "\nActive users:")?;
        for (index, entry) in self.active.iter().enumerate() {
            let validity = if entry.format_valid {
                "ok"
            } else {
                "INVALID FORMAT"
            };
            writeln!(
                f,
                "  {}. {} - {} [{validity}]",
                index + 1,
                entry.access_id,
                entry.name
            )?;
            if let Some(device) = &entry.device {
                writeln!(f, "     Device: {device}")?;
            }
            if let Some(notes) = &entry.notes {
                writeln!(f, "     Notes: {notes}")?;
            }
        }

        writeln!(f, "\nRevoked users:")?;
        for entry in &self.revoked {
            writeln!(f, "  x {} - {}", entry.access_id, entry.name)?;
        }

        writeln!(f, "\nYour Device ID: {}", self.device_id)?;
        let verdict = match (self.allowed, self.mode) {
            (true, PolicyMode::Open) => "YES (open mode, everyone allowed)",
            (true, PolicyMode::Whitelist) => "YES",
            (false, _) => "NO",
        };
        writeln!(f, "You are allowed: {verdict}")?;

        if !self.allowed {
            writeln!(f, "\nTo grant this device access, add a record:")?;
            writeln!(f, "   Access ID: {}", self.device_id)?;
            writeln!(f, "   Name: <owner>")?;
            writeln!(f, "   Status: Active")?;
        }
        Ok(())
    }
}

/// Fetch the live table and report on it. Does not touch the cache.
pub fn validate_policy<P: PolicySource>(
    source: &P,
    device_id: &DeviceId,
) -> Result<PolicyReport, FetchError> {
    let snapshot = source.fetch_snapshot()?;
    Ok(PolicyReport::build(&snapshot, device_id))
}

/// Drop the cached authorization so the next launch must reach the table.
pub fn clear_cache<S: KeyValueStore>(store: S) -> Result<(), StorageError> {
    AuthorizationCache::new(store).clear()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MASTER_SWITCH_ID;
    use crate::storage::MemoryStore;
    use chrono::Utc;

    fn device() -> DeviceId {
        DeviceId::parse("AMP-0000-1111-2222").unwrap()
    }

    fn table() -> PolicySnapshot {
        let mut tablet = PolicyRecord::new("AMP-0000-1111-2222", "Active");
        tablet.name = Some("Pit tablet".to_string());
        tablet.device = Some("iPad".to_string());
        let mut typo = PolicyRecord::new("amp-0000-3333", "Active");
        typo.notes = Some("copied by hand".to_string());
        PolicySnapshot::new(
            vec![
                PolicyRecord::new(MASTER_SWITCH_ID, "Revoked"),
                tablet,
                typo,
                PolicyRecord::new("AMP-0000-4444-5555", "Revoked"),
            ],
            Utc::now(),
        )
    }

    struct StaticSource(PolicySnapshot);

    impl PolicySource for StaticSource {
        fn fetch_snapshot(&self) -> Result<PolicySnapshot, FetchError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn report_splits_active_and_revoked() {
        let report = PolicyReport::build(&table(), &device());
        assert_eq!(report.record_count, 4);
        assert_eq!(report.master_switch.as_deref(), Some("Revoked"));
        assert_eq!(report.mode, PolicyMode::Whitelist);
        assert_eq!(report.active.len(), 2);
        assert!(report.active[0].format_valid);
        assert!(!report.active[1].format_valid);
        assert_eq!(report.active[1].name, UNKNOWN_NAME);
        assert_eq!(report.revoked.len(), 1);
        assert!(report.allowed);
    }

    #[test]
    fn rendered_report_flags_bad_ids_and_shows_grant_steps() {
        let stranger = DeviceId::parse("AMP-0000-9999-9999").unwrap();
        let rendered = PolicyReport::build(&table(), &stranger).to_string();
        assert!(rendered.contains("INVALID FORMAT"));
        assert!(rendered.contains("Device: iPad"));
        assert!(rendered.contains("You are allowed: NO"));
        assert!(rendered.contains("Access ID: AMP-0000-9999-9999"));
    }

    #[test]
    fn validate_reports_open_mode() {
        let open = PolicySnapshot::new(
            vec![PolicyRecord::new(MASTER_SWITCH_ID, "active")],
            Utc::now(),
        );
        let report = validate_policy(&StaticSource(open), &device()).unwrap();
        assert_eq!(report.mode, PolicyMode::Open);
        assert!(report.to_string().contains("YES (open mode"));
    }

    #[test]
    fn clear_cache_forgets_snapshot() {
        let store = MemoryStore::new();
        AuthorizationCache::new(&store).save(&table()).unwrap();
        clear_cache(&store).unwrap();
        assert!(AuthorizationCache::new(&store).load().is_none());
    }
}
