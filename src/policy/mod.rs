//! Remote access-control policy
//!
//! The operator maintains one table. Each row names an access id and a
//! status. One reserved row, `SYSTEM-CONTROL`, is the master switch:
//!
//! - master switch `Active` -> **open mode**, every device runs
//! - anything else, or no master switch -> **whitelist mode**, only rows
//!   with status `Active` admit the device they name
//!
//! The mode is never stored. It is recomputed from whichever snapshot the
//! orchestrator is holding, live or cached.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod client;
pub mod evaluate;

pub use client::{parse_table, PolicySource, PolicyStoreClient};
pub use evaluate::{evaluate, Evaluation};

/// Access id of the master switch row.
pub const MASTER_SWITCH_ID: &str = "SYSTEM-CONTROL";

const ACTIVE_STATUS: &str = "active";
const REVOKED_STATUS: &str = "revoked";

/// One row of the operator's table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    /// Remote row id, when the table exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default)]
    pub access_id: String,
    #[serde(default)]
    pub status: String,
    // Descriptive columns, carried for operator diagnostics only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PolicyRecord {
    pub fn new(access_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            access_id: access_id.into(),
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn is_master_switch(&self) -> bool {
        self.access_id == MASTER_SWITCH_ID
    }

    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(ACTIVE_STATUS)
    }

    pub fn is_revoked(&self) -> bool {
        self.status.eq_ignore_ascii_case(REVOKED_STATUS)
    }
}

/// Which branch of the policy a snapshot selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Open,
    Whitelist,
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Whitelist => write!(f, "whitelist"),
        }
    }
}

/// Every record from one fetch, with the time it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySnapshot {
    records: Vec<PolicyRecord>,
    fetched_at: DateTime<Utc>,
}

impl PolicySnapshot {
    pub fn new(records: Vec<PolicyRecord>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            records,
            fetched_at,
        }
    }

    pub fn records(&self) -> &[PolicyRecord] {
        &self.records
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// The first `SYSTEM-CONTROL` row, if any.
    pub fn master_switch(&self) -> Option<&PolicyRecord> {
        self.records.iter().find(|record| record.is_master_switch())
    }

    pub fn open_mode(&self) -> bool {
        self.master_switch().is_some_and(PolicyRecord::is_active)
    }

    pub fn mode(&self) -> PolicyMode {
        if self.open_mode() {
            PolicyMode::Open
        } else {
            PolicyMode::Whitelist
        }
    }

    /// Trimmed, upper-cased access ids of active non-master rows.
    pub fn whitelist(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .filter(|record| !record.is_master_switch() && record.is_active())
            .map(|record| record.access_id.trim().to_uppercase())
            .filter(|id| !id.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(records: Vec<PolicyRecord>) -> PolicySnapshot {
        PolicySnapshot::new(records, Utc::now())
    }

    #[test]
    fn open_mode_requires_active_master_switch() {
        assert!(snapshot(vec![PolicyRecord::new(MASTER_SWITCH_ID, "Active")]).open_mode());
        assert!(snapshot(vec![PolicyRecord::new(MASTER_SWITCH_ID, "ACTIVE")]).open_mode());
        assert!(!snapshot(vec![PolicyRecord::new(MASTER_SWITCH_ID, "Revoked")]).open_mode());
        assert!(!snapshot(vec![PolicyRecord::new(MASTER_SWITCH_ID, "")]).open_mode());
        assert!(!snapshot(vec![PolicyRecord::new("AMP-0000-0000-0001", "Active")]).open_mode());
        assert!(!snapshot(vec![]).open_mode());
    }

    #[test]
    fn first_master_switch_wins() {
        let snap = snapshot(vec![
            PolicyRecord::new(MASTER_SWITCH_ID, "Revoked"),
            PolicyRecord::new(MASTER_SWITCH_ID, "Active"),
        ]);
        assert_eq!(snap.mode(), PolicyMode::Whitelist);
    }

    #[test]
    fn whitelist_excludes_master_switch_and_inactive_rows() {
        let snap = snapshot(vec![
            PolicyRecord::new(MASTER_SWITCH_ID, "Active"),
            PolicyRecord::new("  amp-ab12-cd34-ef56  ", "active"),
            PolicyRecord::new("AMP-0000-0000-0002", "Revoked"),
            PolicyRecord::new("   ", "Active"),
        ]);
        let whitelist = snap.whitelist();
        assert_eq!(whitelist.len(), 1);
        assert!(whitelist.contains("AMP-AB12-CD34-EF56"));
    }
}
