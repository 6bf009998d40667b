//! Policy store client
//!
//! One authenticated GET per launch against the operator's table. The
//! expected body is
//!
//! ```json
//! { "records": [ { "id": "rec..", "fields": { "Access ID": "..", "Status": ".." } } ] }
//! ```
//!
//! Anything else is a malformed response. Non-string column values are
//! treated as absent. No retries; the agent timeout bounds the wait.

use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::config::{BearerToken, GateConfig};
use crate::error::FetchError;
use crate::policy::{PolicyRecord, PolicySnapshot};

const ACCESS_ID_FIELD: &str = "Access ID";
const STATUS_FIELD: &str = "Status";
const NAME_FIELD: &str = "Name";
const DEVICE_FIELD: &str = "Device";
const NOTES_FIELD: &str = "Notes";

/// Anything that can produce a fresh policy snapshot.
pub trait PolicySource {
    fn fetch_snapshot(&self) -> Result<PolicySnapshot, FetchError>;
}

impl<T: PolicySource + ?Sized> PolicySource for &T {
    fn fetch_snapshot(&self) -> Result<PolicySnapshot, FetchError> {
        (**self).fetch_snapshot()
    }
}

/// HTTPS client for the remote policy table.
pub struct PolicyStoreClient {
    agent: ureq::Agent,
    endpoint: String,
    token: BearerToken,
}

impl PolicyStoreClient {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            agent: build_http_agent(config.timeout, &config.user_agent),
            endpoint: config.policy_endpoint.clone(),
            token: config.bearer_token.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PolicySource for PolicyStoreClient {
    fn fetch_snapshot(&self) -> Result<PolicySnapshot, FetchError> {
        debug!("Fetching policy table from {}", self.endpoint);
        let authorization = Zeroizing::new(format!("Bearer {}", self.token.expose()));
        let response = self
            .agent
            .get(&self.endpoint)
            .set("Authorization", &authorization)
            .set("Content-Type", "application/json")
            .call()
            .map_err(fetch_error_from_ureq)?;
        let body = response
            .into_string()
            .map_err(|e| FetchError::Network(format!("reading body: {e}")))?;
        let records = parse_table(&body)?;
        info!("Fetched {} policy records", records.len());
        Ok(PolicySnapshot::new(records, Utc::now()))
    }
}

/// Parse a policy table response body into records.
pub fn parse_table(body: &str) -> Result<Vec<PolicyRecord>, FetchError> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("invalid json: {e}")))?;
    let records = root
        .get("records")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Malformed("missing `records` array".to_string()))?;

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let fields = record
                .get("fields")
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    FetchError::Malformed(format!("record {index} has no `fields` object"))
                })?;
            Ok(PolicyRecord {
                record_id: record.get("id").and_then(Value::as_str).map(str::to_string),
                access_id: string_field(fields, ACCESS_ID_FIELD).unwrap_or_default(),
                status: string_field(fields, STATUS_FIELD).unwrap_or_default(),
                name: string_field(fields, NAME_FIELD),
                device: string_field(fields, DEVICE_FIELD),
                notes: string_field(fields, NOTES_FIELD),
            })
        })
        .collect()
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn build_http_agent(timeout: Duration, user_agent: &str) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
}

fn fetch_error_from_ureq(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(status, response) => {
            FetchError::Network(format!("HTTP {status}: {}", response.status_text()))
        }
        ureq::Error::Transport(transport) => {
            FetchError::Network(format!("{}: {transport}", classify_transport(&transport)))
        }
    }
}

fn classify_transport(transport: &ureq::Transport) -> &'static str {
    let lower = format!("{:?} {}", transport.kind(), transport).to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}
