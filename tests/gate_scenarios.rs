//! End-to-end gate behavior against a file-backed store.

use std::cell::Cell;

use ampact_gate::storage::{CACHED_AUTHORIZATION_KEY, DEVICE_ID_KEY};
use ampact_gate::{
    is_valid_device_id, AuthorizationCache, DecisionSource, DeviceId, DeviceIdentityProvider,
    EnvironmentSignals, FetchError, FileStore, Gate, KeyValueStore, PolicyMode, PolicyRecord,
    PolicySnapshot, PolicySource, MASTER_SWITCH_ID,
};
use chrono::Utc;
use tempfile::tempdir;

/// Serves a table until switched offline.
struct Table {
    records: Vec<PolicyRecord>,
    online: Cell<bool>,
}

impl Table {
    fn new(records: &[(&str, &str)]) -> Self {
        Self {
            records: records
                .iter()
                .map(|(id, status)| PolicyRecord::new(*id, *status))
                .collect(),
            online: Cell::new(true),
        }
    }

    fn offline() -> Self {
        let table = Self::new(&[]);
        table.online.set(false);
        table
    }
}

impl PolicySource for Table {
    fn fetch_snapshot(&self) -> Result<PolicySnapshot, FetchError> {
        if !self.online.get() {
            return Err(FetchError::Network("HTTP 503: Service Unavailable".to_string()));
        }
        Ok(PolicySnapshot::new(self.records.clone(), Utc::now()))
    }
}

fn signals() -> EnvironmentSignals {
    EnvironmentSignals {
        screen: "1280x800x24".to_string(),
        user_agent: "ampact-gate (linux aarch64)".to_string(),
        language: "en-GB".to_string(),
        platform: "linux aarch64".to_string(),
        hardware_concurrency: 4,
        device_memory: 4.0,
        timezone: "Europe/London".to_string(),
        timezone_offset: 0,
        canvas: "canvas_unavailable".to_string(),
    }
}

fn store_for(dir: &std::path::Path, device: &str) -> FileStore {
    let store = FileStore::in_dir(dir);
    store.set(DEVICE_ID_KEY, device).unwrap();
    store
}

#[test]
fn scenario_a_open_mode_admits_everyone() {
    let table = Table::new(&[
        (MASTER_SWITCH_ID, "Active"),
        ("AMP-0000-0000-0000", "Revoked"),
    ]);
    for device in ["AMP-9999-9999-9999", "AMP-0000-0000-0000"] {
        let dir = tempdir().unwrap();
        let decision = Gate::new(&table, store_for(dir.path(), device), signals()).authorize();
        assert!(decision.allowed, "{device}");
        assert_eq!(decision.source, DecisionSource::Live);
        assert_eq!(decision.mode, Some(PolicyMode::Open));
    }
}

#[test]
fn scenario_b_whitelist_admits_only_listed_device() {
    let table = Table::new(&[("AMP-1111-1111-1111", "Active")]);

    let dir = tempdir().unwrap();
    let allowed = Gate::new(&table, store_for(dir.path(), "AMP-1111-1111-1111"), signals());
    assert!(allowed.authorize().allowed);

    let dir = tempdir().unwrap();
    let denied = Gate::new(&table, store_for(dir.path(), "AMP-2222-2222-2222"), signals());
    let decision = denied.authorize();
    assert!(!decision.allowed);
    assert_eq!(decision.source, DecisionSource::Live);
}

#[test]
fn first_launch_offline_fails_open() {
    let dir = tempdir().unwrap();
    let context = Gate::new(Table::offline(), FileStore::in_dir(dir.path()), signals()).check();

    assert!(context.decision.allowed);
    assert_eq!(context.decision.source, DecisionSource::FailOpen);
    assert!(is_valid_device_id(context.device_id.as_str()));
}

#[test]
fn revoked_device_stays_locked_out_offline() {
    let dir = tempdir().unwrap();
    let table = Table::new(&[
        (MASTER_SWITCH_ID, "Revoked"),
        ("AMP-1111-1111-1111", "Active"),
    ]);
    let store = store_for(dir.path(), "AMP-2222-2222-2222");
    let gate = Gate::new(&table, &store, signals());

    assert!(!gate.authorize().allowed);
    table.online.set(false);
    let decision = gate.authorize();
    assert!(!decision.allowed);
    assert_eq!(decision.source, DecisionSource::Cache);
    assert_eq!(decision.mode, Some(PolicyMode::Whitelist));
}

#[test]
fn cached_open_mode_admits_offline() {
    let dir = tempdir().unwrap();
    let table = Table::new(&[(MASTER_SWITCH_ID, "active")]);
    let store = store_for(dir.path(), "AMP-2222-2222-2222");
    let gate = Gate::new(&table, &store, signals());

    gate.authorize();
    table.online.set(false);
    let decision = gate.authorize();
    assert!(decision.allowed);
    assert_eq!(decision.source, DecisionSource::Cache);
    assert_eq!(decision.mode, Some(PolicyMode::Open));
}

#[test]
fn device_id_is_stable_across_launches() {
    let dir = tempdir().unwrap();
    let first = Gate::new(Table::offline(), FileStore::in_dir(dir.path()), signals()).check();

    let mut changed = signals();
    changed.screen = "2560x1440x30".to_string();
    let second = Gate::new(Table::offline(), FileStore::in_dir(dir.path()), changed).check();

    assert_eq!(first.device_id, second.device_id);
    let provider = DeviceIdentityProvider::new(FileStore::in_dir(dir.path()), signals());
    assert_eq!(
        provider.get_or_create().unwrap().into_device_id(),
        first.device_id
    );
}

#[test]
fn offline_launch_leaves_cache_untouched() {
    let dir = tempdir().unwrap();
    let table = Table::new(&[("AMP-1111-1111-1111", "Active")]);
    let store = store_for(dir.path(), "AMP-1111-1111-1111");
    let gate = Gate::new(&table, &store, signals());
    gate.authorize();
    let cached = store.get(CACHED_AUTHORIZATION_KEY).unwrap();
    let cached_at = AuthorizationCache::new(&store).load().unwrap().fetched_at();

    table.online.set(false);
    for _ in 0..3 {
        assert_eq!(gate.authorize().source, DecisionSource::Cache);
    }
    assert_eq!(store.get(CACHED_AUTHORIZATION_KEY).unwrap(), cached);
    assert_eq!(
        AuthorizationCache::new(&store).load().unwrap().fetched_at(),
        cached_at
    );
}

#[test]
fn whitelisted_id_with_stray_whitespace_and_case() {
    let dir = tempdir().unwrap();
    let table = Table::new(&[("  amp-ab12-cd34-ef56  ", "ACTIVE")]);
    let device = DeviceId::parse("AMP-AB12-CD34-EF56").unwrap();
    let gate = Gate::new(&table, store_for(dir.path(), device.as_str()), signals());
    assert!(gate.authorize().allowed);
}

#[test]
fn corrupt_store_still_caches_live_deny() {
    let dir = tempdir().unwrap();
    let store = FileStore::in_dir(dir.path());
    std::fs::write(store.path(), "{truncated").unwrap();

    let table = Table::new(&[("AMP-1111-1111-1111", "Active")]);
    let gate = Gate::new(&table, &store, signals());
    let live = gate.check();
    assert!(!live.decision.allowed);
    assert_eq!(live.decision.source, DecisionSource::Live);
    assert!(live.recovered.is_empty());
    assert_eq!(
        store.get(DEVICE_ID_KEY).unwrap().as_deref(),
        Some(live.device_id.as_str())
    );

    table.online.set(false);
    let offline = gate.check();
    assert!(!offline.decision.allowed);
    assert_eq!(offline.decision.source, DecisionSource::Cache);
    assert_eq!(offline.device_id, live.device_id);
}
