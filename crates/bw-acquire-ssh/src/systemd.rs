//! Parsing helpers for `systemctl` output.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime, TimeZone, Utc};

/// `Key=Value` lines from `systemctl show`.
pub fn parse_properties(stdout: &str) -> BTreeMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Unit names from `systemctl list-units --plain` matching `prefix*suffix`.
pub fn parse_unit_list(stdout: &str, prefix: &str, suffix: &str) -> Vec<String> {
    let mut units: Vec<String> = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().find(|tok| tok.starts_with(prefix) && tok.ends_with(suffix)))
        .map(String::from)
        .collect();
    units.sort();
    units.dedup();
    units
}

/// A systemd timestamp property as epoch seconds.
///
/// Accepts `--timestamp=unix` output (`@1764367254`) and the default
/// `Fri 2025-11-28 17:00:54 EST` form, read as UTC when the zone says so and
/// as host-local time otherwise. Empty and `n/a` mean never.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value == "n/a" || value == "0" {
        return None;
    }
    if let Some(secs) = value.strip_prefix('@') {
        return secs.parse::<f64>().ok().filter(|s| s.is_finite() && *s > 0.0);
    }
    let (naive_part, zone) = value.rsplit_once(' ')?;
    let naive = NaiveDateTime::parse_from_str(naive_part, "%a %Y-%m-%d %H:%M:%S").ok()?;
    let ts = if zone == "UTC" {
        Utc.from_utc_datetime(&naive).timestamp()
    } else {
        Local.from_local_datetime(&naive).earliest()?.timestamp()
    };
    Some(ts as f64)
}
