//! Environment signals for device fingerprinting
//!
//! A browser host exposes display geometry, user agent, locale, platform,
//! processor count, approximate memory, timezone and a canvas rendering
//! probe. A native host has equivalents for most of these:
//! - locale from `LC_ALL` / `LC_MESSAGES` / `LANG`
//! - processor count from `available_parallelism`
//! - memory from `/proc/meminfo`, bucketed the way `navigator.deviceMemory` is
//! - timezone from `TZ`, `/etc/timezone` or the `/etc/localtime` link
//!
//! Signals only need to be stable for one installation and to differ across
//! installations often enough for an operator to tell devices apart. None of
//! this is a security boundary.

use std::env;
use std::fs;

use serde::Serialize;

/// Stand-in for the canvas probe on hosts that cannot render one.
pub const CANVAS_UNAVAILABLE: &str = "canvas_unavailable";

const MAX_MEMORY_BUCKET_GIB: f64 = 8.0;
const MIN_MEMORY_BUCKET_GIB: f64 = 0.25;

/// Raw inputs to the device fingerprint.
///
/// Field order is significant: it fixes the serialized fingerprint input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSignals {
    /// `<width>x<height>x<color depth>`
    pub screen: String,
    pub user_agent: String,
    pub language: String,
    pub platform: String,
    pub hardware_concurrency: u32,
    /// Approximate memory in GiB, power-of-two buckets from 0.25 to 8.
    pub device_memory: f64,
    pub timezone: String,
    /// Minutes to add to local time to get UTC.
    pub timezone_offset: i32,
    pub canvas: String,
}

/// Anything that can report the current environment signals.
pub trait SignalSource {
    fn collect(&self) -> EnvironmentSignals;
}

impl<T: SignalSource + ?Sized> SignalSource for &T {
    fn collect(&self) -> EnvironmentSignals {
        (**self).collect()
    }
}

/// A fixed set of signals reports itself.
impl SignalSource for EnvironmentSignals {
    fn collect(&self) -> EnvironmentSignals {
        self.clone()
    }
}

/// Signals read from the native host process.
#[derive(Debug, Default)]
pub struct HostSignals {
    _private: (),
}

impl HostSignals {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl SignalSource for HostSignals {
    fn collect(&self) -> EnvironmentSignals {
        let platform = platform();
        EnvironmentSignals {
            screen: display_geometry(),
            user_agent: format!("ampact-gate ({platform})"),
            language: language(),
            platform,
            hardware_concurrency: std::thread::available_parallelism()
                .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
                .unwrap_or(0),
            device_memory: total_memory_kib().map_or(0.0, bucket_memory_gib),
            timezone: timezone_name(),
            timezone_offset: -(chrono::Local::now().offset().local_minus_utc() / 60),
            canvas: CANVAS_UNAVAILABLE.to_string(),
        }
    }
}

fn platform() -> String {
    format!("{} {}", env::consts::OS, env::consts::ARCH)
}

fn display_geometry() -> String {
    let columns = env_u32("COLUMNS").unwrap_or(0);
    let lines = env_u32("LINES").unwrap_or(0);
    let depth = match env::var("COLORTERM").as_deref() {
        Ok("truecolor") | Ok("24bit") => 24,
        _ => 8,
    };
    format!("{columns}x{lines}x{depth}")
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok()?.trim().parse().ok()
}

fn language() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .map(|raw| normalize_locale(&raw))
        .unwrap_or_else(|| "en-US".to_string())
}

/// `en_US.UTF-8` -> `en-US`
fn normalize_locale(raw: &str) -> String {
    let base = raw.split(['.', '@']).next().unwrap_or(raw).trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return "en-US".to_string();
    }
    base.replace('_', "-")
}

fn timezone_name() -> String {
    if let Ok(tz) = env::var("TZ") {
        let tz = tz.trim_start_matches(':').trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }
    if let Ok(raw) = fs::read_to_string("/etc/timezone") {
        let tz = raw.trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }
    if let Ok(target) = fs::read_link("/etc/localtime") {
        let target = target.to_string_lossy();
        if let Some((_, zone)) = target.split_once("zoneinfo/") {
            return zone.to_string();
        }
    }
    "UTC".to_string()
}

fn total_memory_kib() -> Option<u64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_total_kib(&meminfo)
}

fn parse_mem_total_kib(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

/// Round down to a power of two, clamped to `[0.25, 8]` GiB.
fn bucket_memory_gib(total_kib: u64) -> f64 {
    if total_kib == 0 {
        return 0.0;
    }
    let gib = total_kib as f64 / (1024.0 * 1024.0);
    let mut bucket = MAX_MEMORY_BUCKET_GIB;
    while bucket > MIN_MEMORY_BUCKET_GIB && bucket > gib {
        bucket /= 2.0;
    }
    bucket
}
