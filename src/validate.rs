//! Row validation: loosely-typed CSV rows into [`EventRecord`]s.
//!
//! All field-level checks for a row run to completion and their errors are
//! reported together, except missing required fields, which short-circuit
//! because the remaining checks would only produce noise about absent data.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::config::{MAX_ANNOTATION_LEN, MAX_EVENT_NAME_LEN, MAX_IP_LIST_LEN};
use crate::error::ValidationError;
use crate::event::{
    is_valid_date, parse_port, split_multi, AttackType, EventRecord, Target, Tlp,
};
use crate::schema::Schema;

/// One CSV data row, keyed by header column name. Ephemeral: lives only for
/// the duration of one `validate_row` call.
pub type RawRow = HashMap<String, String>;

fn field<'a>(row: &'a RawRow, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or("").trim()
}

/// Validates one row against `schema` and converts it to an [`EventRecord`].
///
/// `row_number` is 1-based with the header as row 1, so the first data row
/// is row 2; it is embedded in every error message. The input row is never
/// mutated.
pub fn validate_row(
    row: &RawRow,
    row_number: usize,
    schema: Schema,
) -> Result<EventRecord, ValidationError> {
    // Required-field presence first; anything else is noise if these fail.
    let missing: Vec<String> = schema
        .required_columns()
        .iter()
        .filter(|col| field(row, col).is_empty())
        .map(|col| format!("Row {row_number}: Missing required field '{col}'"))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::new(missing));
    }

    let mut errors = Vec::new();

    let event_name = field(row, "event_name").to_string();
    if event_name.chars().count() > MAX_EVENT_NAME_LEN {
        errors.push(format!(
            "Row {row_number}: Event name exceeds {MAX_EVENT_NAME_LEN} characters"
        ));
    }

    let date_str = field(row, "date").to_string();
    if !is_valid_date(&date_str) {
        errors.push(format!(
            "Row {row_number}: Invalid date format. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"
        ));
    }

    let attacker_ips = parse_ip_list(
        field(row, "attacker_ips"),
        "attacker",
        row_number,
        &mut errors,
    );
    if attacker_ips.is_empty() && !errors.iter().any(|e| e.contains("attacker")) {
        errors.push(format!("Row {row_number}: No attacker IPs provided"));
    }

    let annotation_column = match schema {
        Schema::Playbook => "description",
        Schema::Annotation => "annotation_text",
    };
    let annotation = field(row, annotation_column).to_string();
    if annotation.chars().count() > MAX_ANNOTATION_LEN {
        errors.push(format!(
            "Row {row_number}: {annotation_column} exceeds {MAX_ANNOTATION_LEN} characters"
        ));
    }

    let tlp = parse_tlp(field(row, "tlp"), row_number, &mut errors);

    let target = match schema {
        Schema::Playbook => validate_playbook_target(row, row_number, &mut errors),
        Schema::Annotation => validate_destinations(row, row_number, &mut errors),
    };

    if !errors.is_empty() {
        return Err(ValidationError::new(errors));
    }

    // All checks passed, so the placeholder-free target must exist.
    let target = target.ok_or_else(|| {
        ValidationError::single(format!("Row {row_number}: internal target validation error"))
    })?;

    Ok(EventRecord {
        event_name,
        event_date: date_str,
        attacker_ips,
        target,
        annotation,
        tlp,
    })
}

fn parse_ip_list(
    raw: &str,
    kind: &str,
    row_number: usize,
    errors: &mut Vec<String>,
) -> Vec<IpAddr> {
    let segments = split_multi(raw);
    if segments.len() > MAX_IP_LIST_LEN {
        errors.push(format!(
            "Row {row_number}: Too many {kind} IPs (max {MAX_IP_LIST_LEN})"
        ));
        return Vec::new();
    }

    let mut ips = Vec::with_capacity(segments.len());
    for seg in segments {
        match seg.parse::<IpAddr>() {
            Ok(ip) => ips.push(ip),
            Err(_) => errors.push(format!(
                "Row {row_number}: Invalid {kind} IP address '{seg}'"
            )),
        }
    }
    ips
}

fn parse_port_list(raw: &str, kind: &str, row_number: usize, errors: &mut Vec<String>) -> Vec<u16> {
    let mut ports = Vec::new();
    for seg in split_multi(raw) {
        match parse_port(seg) {
            Some(p) => ports.push(p),
            None => errors.push(format!("Row {row_number}: Invalid {kind} port '{seg}'")),
        }
    }
    ports
}

fn parse_tlp(raw: &str, row_number: usize, errors: &mut Vec<String>) -> Tlp {
    if raw.is_empty() {
        return Tlp::default();
    }
    match raw.parse::<Tlp>() {
        Ok(tlp) => tlp,
        Err(_) => {
            errors.push(format!(
                "Row {row_number}: Invalid TLP level '{raw}'. Must be one of clear, green, amber, red"
            ));
            Tlp::default()
        }
    }
}

fn validate_playbook_target(
    row: &RawRow,
    row_number: usize,
    errors: &mut Vec<String>,
) -> Option<Target> {
    let before = errors.len();

    let victim_ip_raw = field(row, "victim_ip");
    let victim_ip = match victim_ip_raw.parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            errors.push(format!(
                "Row {row_number}: Invalid victim IP address '{victim_ip_raw}'"
            ));
            None
        }
    };

    let victim_port_raw = field(row, "victim_port");
    let victim_port = parse_port(victim_port_raw);
    if victim_port.is_none() {
        errors.push(format!(
            "Row {row_number}: Invalid victim port '{victim_port_raw}'"
        ));
    }

    let attack_type_raw = field(row, "attack_type");
    let attack_type = match attack_type_raw.parse::<AttackType>() {
        Ok(a) => Some(a),
        Err(_) => {
            errors.push(format!(
                "Row {row_number}: Invalid attack type '{attack_type_raw}'. Must be one of direct-flood, amplification, both"
            ));
            None
        }
    };

    let attacker_ports = parse_port_list(field(row, "attacker_ports"), "attacker", row_number, errors);

    if errors.len() > before {
        return None;
    }
    Some(Target::Victim {
        ip: victim_ip?,
        port: victim_port?,
        attacker_ports,
        attack_type: attack_type?,
    })
}

fn validate_destinations(
    row: &RawRow,
    row_number: usize,
    errors: &mut Vec<String>,
) -> Option<Target> {
    let before = errors.len();
    let ips = parse_ip_list(field(row, "destination_ips"), "destination", row_number, errors);
    let ports = parse_port_list(field(row, "destination_ports"), "destination", row_number, errors);
    if errors.len() > before {
        return None;
    }
    Some(Target::Destinations { ips, ports })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn valid_annotation_row() -> RawRow {
        row(&[
            ("date", "2024-01-15"),
            ("event_name", "DDoS Attack on Web Server"),
            ("attacker_ips", "192.168.1.100;192.168.1.101"),
            ("annotation_text", "Large-scale DDoS attack"),
            ("destination_ips", "10.0.0.50"),
            ("destination_ports", "443"),
            ("tlp", "amber"),
        ])
    }

    #[test]
    fn valid_row_normalizes() {
        let record = validate_row(&valid_annotation_row(), 2, Schema::Annotation).unwrap();
        assert_eq!(record.event_name, "DDoS Attack on Web Server");
        assert_eq!(record.attacker_ips.len(), 2);
        assert_eq!(record.tlp, Tlp::Amber);
        assert_eq!(
            record.target,
            Target::Destinations {
                ips: vec!["10.0.0.50".parse().unwrap()],
                ports: vec![443],
            }
        );
    }

    #[test]
    fn missing_required_fields_short_circuit() {
        let r = row(&[("date", "2024-01-15"), ("attacker_ips", "not-an-ip")]);
        let err = validate_row(&r, 3, Schema::Annotation).unwrap_err();
        // Only the presence errors are reported; the bogus IP is not checked.
        assert!(err
            .messages
            .iter()
            .all(|m| m.contains("Missing required field")));
        assert!(err.to_string().contains("event_name"));
        assert!(err.to_string().contains("annotation_text"));
        assert!(err.to_string().contains("Row 3"));
    }

    #[test]
    fn field_errors_are_collected_not_fail_fast() {
        let mut r = valid_annotation_row();
        r.insert("date".into(), "yesterday".into());
        r.insert("attacker_ips".into(), "999.9.9.9".into());
        r.insert("destination_ports".into(), "0".into());
        let err = validate_row(&r, 2, Schema::Annotation).unwrap_err();
        assert_eq!(err.messages.len(), 3, "{err}");
        assert!(err.to_string().contains("Invalid date format"));
        assert!(err.to_string().contains("999.9.9.9"));
        assert!(err.to_string().contains("Invalid destination port '0'"));
    }

    #[test]
    fn rejects_oversized_event_name() {
        let mut r = valid_annotation_row();
        r.insert("event_name".into(), "x".repeat(256));
        let err = validate_row(&r, 2, Schema::Annotation).unwrap_err();
        assert!(err.to_string().contains("Event name exceeds 255"));
    }

    #[test]
    fn rejects_oversized_annotation() {
        let mut r = valid_annotation_row();
        r.insert("annotation_text".into(), "x".repeat(5001));
        let err = validate_row(&r, 2, Schema::Annotation).unwrap_err();
        assert!(err.to_string().contains("annotation_text exceeds 5000"));
    }

    #[test]
    fn rejects_too_many_attacker_ips() {
        let mut r = valid_annotation_row();
        let flood = (0..1001)
            .map(|i| format!("10.{}.{}.{}", i / 65536, (i / 256) % 256, i % 256))
            .collect::<Vec<_>>()
            .join(";");
        r.insert("attacker_ips".into(), flood);
        let err = validate_row(&r, 2, Schema::Annotation).unwrap_err();
        assert!(err.to_string().contains("Too many attacker IPs (max 1000)"));
    }

    #[test]
    fn empty_segments_in_multi_value_cells_are_dropped() {
        let mut r = valid_annotation_row();
        r.insert("attacker_ips".into(), "192.0.2.1; ;;192.0.2.2;".into());
        let record = validate_row(&r, 2, Schema::Annotation).unwrap();
        assert_eq!(record.attacker_ips.len(), 2);
    }

    #[test]
    fn tlp_defaults_to_green_when_blank() {
        let mut r = valid_annotation_row();
        r.insert("tlp".into(), "  ".into());
        let record = validate_row(&r, 2, Schema::Annotation).unwrap();
        assert_eq!(record.tlp, Tlp::Green);
    }

    #[test]
    fn invalid_tlp_is_an_error() {
        let mut r = valid_annotation_row();
        r.insert("tlp".into(), "purple".into());
        let err = validate_row(&r, 2, Schema::Annotation).unwrap_err();
        assert!(err.to_string().contains("Invalid TLP level 'purple'"));
    }

    #[test]
    fn playbook_schema_valid_row() {
        let r = row(&[
            ("date", "2024-01-15 08:30:00"),
            ("event_name", "Amplification attack"),
            ("attack_type", "amplification"),
            ("attacker_ips", "203.0.113.5;203.0.113.6"),
            ("attacker_ports", "53;123"),
            ("victim_ip", "198.51.100.7"),
            ("victim_port", "443"),
            ("description", "NTP/DNS amplification flood"),
        ]);
        let record = validate_row(&r, 2, Schema::Playbook).unwrap();
        assert_eq!(
            record.target,
            Target::Victim {
                ip: "198.51.100.7".parse().unwrap(),
                port: 443,
                attacker_ports: vec![53, 123],
                attack_type: AttackType::Amplification,
            }
        );
        assert_eq!(record.annotation, "NTP/DNS amplification flood");
    }

    #[test]
    fn playbook_schema_rejects_bad_victim() {
        let r = row(&[
            ("date", "2024-01-15"),
            ("event_name", "x"),
            ("attack_type", "direct-flood"),
            ("attacker_ips", "203.0.113.5"),
            ("victim_ip", "not-an-ip"),
            ("victim_port", "99999"),
            ("description", "d"),
        ]);
        let err = validate_row(&r, 2, Schema::Playbook).unwrap_err();
        assert!(err.to_string().contains("Invalid victim IP address"));
        assert!(err.to_string().contains("Invalid victim port '99999'"));
    }

    #[test]
    fn normalized_record_revalidates_to_an_equal_record() {
        let record = validate_row(&valid_annotation_row(), 2, Schema::Annotation).unwrap();

        let ips: Vec<String> = record.attacker_ips.iter().map(|ip| ip.to_string()).collect();
        let (dest_ips, dest_ports) = match &record.target {
            Target::Destinations { ips, ports } => (
                ips.iter().map(|ip| ip.to_string()).collect::<Vec<_>>().join(";"),
                ports.iter().map(u16::to_string).collect::<Vec<_>>().join(";"),
            ),
            other => panic!("unexpected target: {other:?}"),
        };
        let reserialized = row(&[
            ("date", &record.event_date),
            ("event_name", &record.event_name),
            ("attacker_ips", &ips.join(";")),
            ("annotation_text", &record.annotation),
            ("destination_ips", &dest_ips),
            ("destination_ports", &dest_ports),
            ("tlp", &record.tlp.to_string()),
        ]);

        let again = validate_row(&reserialized, 2, Schema::Annotation).unwrap();
        assert_eq!(record, again);
    }

    #[test]
    fn validation_does_not_mutate_input() {
        let r = valid_annotation_row();
        let snapshot = r.clone();
        let _ = validate_row(&r, 2, Schema::Annotation);
        assert_eq!(r, snapshot);
    }
}
