//! Core event data model and field-level validators.
//!
//! An [`EventRecord`] only ever exists after full validation: the Row
//! Validator and the interactive flow are the only constructors, and both
//! run every field check first. Invalid data never reaches this type.

use std::net::IpAddr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::config::DATE_FORMATS;

/// Traffic Light Protocol sharing-sensitivity marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Tlp {
    Clear,
    #[default]
    Green,
    Amber,
    Red,
}

/// DDoS attack classification used by the playbook schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum AttackType {
    DirectFlood,
    Amplification,
    Both,
}

/// The victim/destination side of an event.
///
/// Two variants exist because the CSV schema drifted over time (see
/// [`crate::schema::Schema`]); both map onto the same remote structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Playbook schema: a single victim IP and port, with optional
    /// per-attacker ports and an attack-type classification.
    Victim {
        ip: IpAddr,
        port: u16,
        attacker_ports: Vec<u16>,
        attack_type: AttackType,
    },
    /// Annotation schema: zero or more destination IPs with ports paired
    /// by index.
    Destinations { ips: Vec<IpAddr>, ports: Vec<u16> },
}

/// One validated DDoS event, ready for submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    /// Event title, 1-255 characters.
    pub event_name: String,
    /// Already validated against [`DATE_FORMATS`]; kept as the original
    /// string because MISP accepts both accepted spellings verbatim.
    pub event_date: String,
    /// Attacker/source IPs, 1-1000 entries.
    pub attacker_ips: Vec<IpAddr>,
    pub target: Target,
    /// Free-text description, 1-5000 characters (may be empty for the
    /// playbook schema only when the description column allowed it).
    pub annotation: String,
    pub tlp: Tlp,
}

impl EventRecord {
    /// Workflow state attached to every newly created event.
    ///
    /// Always "new", regardless of any input column: SOC analysts move the
    /// state forward during peer review, never this tool.
    pub const fn workflow_state() -> &'static str {
        "new"
    }
}

/// Returns true if `s` parses as an IPv4 or IPv6 address.
pub fn is_valid_ip(s: &str) -> bool {
    s.trim().parse::<IpAddr>().is_ok()
}

/// Parses a port number, accepting only [1, 65535].
pub fn parse_port(s: &str) -> Option<u16> {
    match s.trim().parse::<u16>() {
        Ok(0) => None,
        Ok(p) => Some(p),
        Err(_) => None,
    }
}

/// Returns true if `s` is a valid port number string.
pub fn is_valid_port(s: &str) -> bool {
    parse_port(s).is_some()
}

/// Returns true if `s` matches `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`.
pub fn is_valid_date(s: &str) -> bool {
    let trimmed = s.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMATS[0]).is_ok()
        || NaiveDateTime::parse_from_str(trimmed, DATE_FORMATS[1]).is_ok()
}

/// Splits a semicolon-separated cell into trimmed, non-empty segments.
pub fn split_multi(s: &str) -> Vec<&str> {
    s.split(';')
        .map(str::trim)
        .filter(|seg| !seg.is_empty())
        .collect()
}
