//! Gate configuration
//!
//! Defaults are baked in at build time, the way the client has always
//! shipped. Each can be overridden from the environment at launch:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `AMPACT_POLICY_ENDPOINT` | policy table URL |
//! | `AMPACT_POLICY_TOKEN` | bearer credential for the table |
//! | `AMPACT_POLICY_TIMEOUT_MS` | fetch timeout |
//! | `AMPACT_DATA_DIR` | where the local store and offline cache live |
//! | `AMPACT_CONTACT_EMAIL` | address shown on the lockout screen |
//!
//! The bearer credential ships inside the client. Anyone holding a build can
//! extract it and read the whole policy table. That exposure is a known
//! weakness of this trust model and is not fixed here.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

const ENDPOINT_VAR: &str = "AMPACT_POLICY_ENDPOINT";
const TOKEN_VAR: &str = "AMPACT_POLICY_TOKEN";
const TIMEOUT_VAR: &str = "AMPACT_POLICY_TIMEOUT_MS";
const DATA_DIR_VAR: &str = "AMPACT_DATA_DIR";
const CONTACT_VAR: &str = "AMPACT_CONTACT_EMAIL";

/// Policy table used when no endpoint is baked in or configured.
pub const DEFAULT_POLICY_ENDPOINT: &str = "https://api.airtable.com/v0/appAMPACTACCESS00/Users";
pub const DEFAULT_CONTACT_EMAIL: &str = "access@ampact.example";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lower bound for a configured timeout
const MIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Bearer credential for the policy table. Wiped on drop, never printed.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub policy_endpoint: String,
    pub bearer_token: BearerToken,
    pub timeout: Duration,
    pub data_dir: PathBuf,
    pub contact_email: String,
    pub user_agent: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy_endpoint: option_env!("AMPACT_POLICY_ENDPOINT")
                .unwrap_or(DEFAULT_POLICY_ENDPOINT)
                .to_string(),
            bearer_token: BearerToken::new(option_env!("AMPACT_POLICY_TOKEN").unwrap_or_default()),
            timeout: DEFAULT_TIMEOUT,
            data_dir: default_data_dir(&|key| env::var(key).ok()),
            contact_email: option_env!("AMPACT_CONTACT_EMAIL")
                .unwrap_or(DEFAULT_CONTACT_EMAIL)
                .to_string(),
            user_agent: format!("ampact-gate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GateConfig {
    /// Build-time defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build-time defaults overlaid with values from `lookup`. Empty values
    /// are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self {
            data_dir: default_data_dir(&lookup),
            ..Self::default()
        };

        if let Some(endpoint) = lookup(ENDPOINT_VAR) {
            config.policy_endpoint = endpoint.trim().to_string();
        }
        if let Some(token) = lookup(TOKEN_VAR) {
            config.bearer_token = BearerToken::new(token.trim());
        }
        if let Some(raw) = lookup(TIMEOUT_VAR) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.timeout = Duration::from_millis(ms).max(MIN_TIMEOUT),
                Err(_) => warn!("Ignoring {TIMEOUT_VAR}={raw:?}, not a millisecond count"),
            }
        }
        if let Some(dir) = lookup(DATA_DIR_VAR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(email) = lookup(CONTACT_VAR) {
            config.contact_email = email.trim().to_string();
        }
        config
    }
}

fn default_data_dir(lookup: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(xdg_config_home) = lookup("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config_home).join("ampact");
    }
    if let Some(home) = lookup("HOME") {
        return PathBuf::from(home).join(".config").join("ampact");
    }
    PathBuf::from(".ampact")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = GateConfig::from_lookup(lookup_from(&[
            (ENDPOINT_VAR, "https://policy.test/v0/base/Users"),
            (TOKEN_VAR, " secret-token "),
            (TIMEOUT_VAR, "2500"),
            (DATA_DIR_VAR, "/var/lib/ampact"),
            (CONTACT_VAR, "ops@ampact.test"),
        ]));
        assert_eq!(config.policy_endpoint, "https://policy.test/v0/base/Users");
        assert_eq!(config.bearer_token.expose(), "secret-token");
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ampact"));
        assert_eq!(config.contact_email, "ops@ampact.test");
    }

    #[test]
    fn bad_or_tiny_timeouts() {
        let config = GateConfig::from_lookup(lookup_from(&[(TIMEOUT_VAR, "soon")]));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        let config = GateConfig::from_lookup(lookup_from(&[(TIMEOUT_VAR, "0")]));
        assert_eq!(config.timeout, MIN_TIMEOUT);
    }

    #[test]
    fn data_dir_follows_xdg_then_home() {
        let config = GateConfig::from_lookup(lookup_from(&[
            ("XDG_CONFIG_HOME", "/xdg"),
            ("HOME", "/home/op"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/xdg/ampact"));

        let config = GateConfig::from_lookup(lookup_from(&[("HOME", "/home/op")]));
        assert_eq!(config.data_dir, PathBuf::from("/home/op/.config/ampact"));

        let config = GateConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.data_dir, PathBuf::from(".ampact"));
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let config = GateConfig::from_lookup(lookup_from(&[(TOKEN_VAR, "pat-very-secret")]));
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("pat-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
