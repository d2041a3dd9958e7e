//! Event payload construction.
//!
//! Builds the JSON body for `events/add` from a validated [`EventRecord`]:
//! the mandatory taxonomy tags, one `ip-port` object per attacker IP, the
//! victim/destination side, and an `annotation` object with the free-text
//! description.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::config::{MAX_ANNOTATION_LEN, MAX_EVENT_NAME_LEN, MAX_IP_LIST_LEN};
use crate::error::ValidationError;
use crate::event::{is_valid_date, EventRecord, Target};

/// Body for `POST events/add`.
#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    #[serde(rename = "Event")]
    pub event: EventBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventBody {
    pub info: String,
    /// `YYYY-MM-DD`; the time-of-day portion, when present in the input,
    /// lives in the annotation instead because MISP event dates are day
    /// granular.
    pub date: String,
    pub distribution: String,
    pub analysis: String,
    pub threat_level_id: String,
    #[serde(rename = "Tag")]
    pub tags: Vec<TagPayload>,
    #[serde(rename = "Object")]
    pub objects: Vec<ObjectPayload>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TagPayload {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectPayload {
    pub name: String,
    #[serde(rename = "meta-category")]
    pub meta_category: String,
    pub description: String,
    #[serde(rename = "Attribute")]
    pub attributes: Vec<AttributePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttributePayload {
    pub object_relation: String,
    #[serde(rename = "type")]
    pub attr_type: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

// MISP enums: distribution 1 = this community, analysis 2 = completed,
// threat level 2 = medium.
const DISTRIBUTION_COMMUNITY: &str = "1";
const ANALYSIS_COMPLETED: &str = "2";
const THREAT_LEVEL_MEDIUM: &str = "2";

/// Returns true if `tag` contains only characters safe to send as a MISP
/// tag name. Rejects separators and shell metacharacters outright rather
/// than escaping them.
pub fn is_safe_tag(tag: &str) -> bool {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| {
        Regex::new(r#"^[a-zA-Z0-9:="\-_.]+$"#).unwrap_or_else(|e| panic!("tag regex: {e}"))
    });
    !tag.is_empty() && re.is_match(tag)
}

fn tag(name: impl Into<String>) -> TagPayload {
    TagPayload { name: name.into() }
}

fn attribute(
    relation: &str,
    attr_type: &str,
    value: impl Into<String>,
    comment: Option<String>,
) -> AttributePayload {
    AttributePayload {
        object_relation: relation.to_string(),
        attr_type: attr_type.to_string(),
        value: value.into(),
        comment,
    }
}

fn ip_port_object(attributes: Vec<AttributePayload>) -> ObjectPayload {
    ObjectPayload {
        name: "ip-port".to_string(),
        meta_category: "network".to_string(),
        description: "An IP address and a port".to_string(),
        attributes,
    }
}

/// Builds the `events/add` payload for one validated record.
///
/// Re-checks the record limits before building anything. The Row Validator
/// already enforces them, but this is the last gate before the network and
/// records can also arrive from the interactive flow.
pub fn build_event_payload(record: &EventRecord) -> Result<EventPayload, ValidationError> {
    revalidate(record)?;

    let tags = checked_tags(vec![
        tag(format!("tlp:{}", record.tlp)),
        tag(r#"information-security-indicators:incident-type="ddos""#),
        tag("misp-event-type:incident"),
        tag("mitre-attack-pattern:T1498"),
        tag(format!(
            r#"workflow:state="{}""#,
            EventRecord::workflow_state()
        )),
    ])?;

    let mut objects = Vec::new();

    // One ip-port object per attacker, with the source port paired by
    // position when one was provided.
    let attacker_ports = match &record.target {
        Target::Victim { attacker_ports, .. } => attacker_ports.as_slice(),
        Target::Destinations { .. } => &[],
    };
    for (i, ip) in record.attacker_ips.iter().enumerate() {
        let comment = Some(format!("Attacker IP {}", i + 1));
        let mut attrs = vec![attribute("ip", "ip-src", ip.to_string(), comment)];
        if let Some(port) = attacker_ports.get(i) {
            attrs.push(attribute("src-port", "port", port.to_string(), None));
        }
        objects.push(ip_port_object(attrs));
    }

    match &record.target {
        Target::Victim {
            ip,
            port,
            attack_type,
            ..
        } => {
            let comment = Some("Victim IP and Port".to_string());
            objects.push(ip_port_object(vec![
                attribute("ip", "ip-dst", ip.to_string(), comment),
                attribute(
                    "dst-port",
                    "port",
                    port.to_string(),
                    Some(format!("Attack type: {attack_type}")),
                ),
            ]));
        }
        Target::Destinations { ips, ports } => {
            for (i, ip) in ips.iter().enumerate() {
                let mut attrs = vec![attribute(
                    "ip",
                    "ip-dst",
                    ip.to_string(),
                    Some(format!("Destination IP {}", i + 1)),
                )];
                if let Some(port) = ports.get(i) {
                    attrs.push(attribute("dst-port", "port", port.to_string(), None));
                }
                objects.push(ip_port_object(attrs));
            }
        }
    }

    if !record.annotation.is_empty() {
        objects.push(ObjectPayload {
            name: "annotation".to_string(),
            meta_category: "misc".to_string(),
            description: "An annotation object allowing analysts to add notes".to_string(),
            attributes: vec![attribute("text", "text", record.annotation.clone(), None)],
        });
    }

    Ok(EventPayload {
        event: EventBody {
            info: record.event_name.clone(),
            date: record.event_date.chars().take(10).collect(),
            distribution: DISTRIBUTION_COMMUNITY.to_string(),
            analysis: ANALYSIS_COMPLETED.to_string(),
            threat_level_id: THREAT_LEVEL_MEDIUM.to_string(),
            tags,
            objects,
        },
    })
}

/// Rejects any tag outside the allowed charset. Tags are attached verbatim
/// to the remote record, so an unsafe one must fail the submission rather
/// than be quietly left off.
fn checked_tags(tags: Vec<TagPayload>) -> Result<Vec<TagPayload>, ValidationError> {
    for t in &tags {
        if !is_safe_tag(&t.name) {
            return Err(ValidationError::single(format!(
                "Invalid tag '{}': only letters, digits and :=\"-_. are allowed",
                t.name
            )));
        }
    }
    Ok(tags)
}

fn revalidate(record: &EventRecord) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    if record.event_name.trim().is_empty() {
        errors.push("Event name must not be empty".to_string());
    }
    if record.event_name.chars().count() > MAX_EVENT_NAME_LEN {
        errors.push(format!("Event name exceeds {MAX_EVENT_NAME_LEN} characters"));
    }
    if record.annotation.chars().count() > MAX_ANNOTATION_LEN {
        errors.push(format!("Annotation exceeds {MAX_ANNOTATION_LEN} characters"));
    }
    if !is_valid_date(&record.event_date) {
        errors.push("Invalid date format. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS".to_string());
    }
    if record.attacker_ips.is_empty() {
        errors.push("At least one attacker IP is required".to_string());
    }
    if record.attacker_ips.len() > MAX_IP_LIST_LEN {
        errors.push(format!("Too many attacker IPs (max {MAX_IP_LIST_LEN})"));
    }
    match &record.target {
        Target::Victim {
            port,
            attacker_ports,
            ..
        } => {
            if *port == 0 || attacker_ports.contains(&0) {
                errors.push("Ports must be in range 1-65535".to_string());
            }
        }
        Target::Destinations { ips, ports } => {
            if ips.len() > MAX_IP_LIST_LEN {
                errors.push(format!("Too many destination IPs (max {MAX_IP_LIST_LEN})"));
            }
            if ports.contains(&0) {
                errors.push("Ports must be in range 1-65535".to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(errors))
    }
}
