//! Versioned CSV schema variants.
//!
//! The batch file format drifted over the tool's history: the original
//! playbook template keyed events on `attack_type`/`victim_ip`/`victim_port`,
//! a later revision on `annotation_text`/`destination_ips`. Both remain
//! supported as explicit, named variants selected with `--schema` instead of
//! silently picking one.

use clap::ValueEnum;
use strum_macros::Display;

/// Which set of CSV columns a batch file uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Schema {
    /// v1 playbook template: single victim IP/port plus attack type.
    Playbook,
    /// v2 template: annotation text plus optional destination IP/port lists.
    #[default]
    Annotation,
}

impl Schema {
    /// Columns that must be present in the header row.
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Schema::Playbook => &[
                "date",
                "event_name",
                "attack_type",
                "attacker_ips",
                "victim_ip",
                "victim_port",
                "description",
            ],
            Schema::Annotation => &["date", "event_name", "attacker_ips", "annotation_text"],
        }
    }

    /// Columns that may be present but are not required.
    pub fn optional_columns(&self) -> &'static [&'static str] {
        match self {
            Schema::Playbook => &["tlp", "attacker_ports"],
            Schema::Annotation => &["tlp", "destination_ips", "destination_ports"],
        }
    }

    /// The required header columns missing from `header`, in schema order.
    pub fn missing_columns(&self, header: &[String]) -> Vec<String> {
        self.required_columns()
            .iter()
            .filter(|col| !header.iter().any(|h| h == *col))
            .map(|col| (*col).to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn annotation_schema_accepts_superset_header() {
        let h = header(&[
            "date",
            "event_name",
            "attacker_ips",
            "annotation_text",
            "tlp",
            "destination_ips",
            "extra_column",
        ]);
        assert!(Schema::Annotation.missing_columns(&h).is_empty());
    }

    #[test]
    fn missing_columns_are_named() {
        let h = header(&["date", "event_name"]);
        let missing = Schema::Annotation.missing_columns(&h);
        assert_eq!(missing, vec!["attacker_ips", "annotation_text"]);
    }

    #[test]
    fn playbook_schema_requires_victim_fields() {
        let h = header(&["date", "event_name", "attack_type", "attacker_ips", "description"]);
        let missing = Schema::Playbook.missing_columns(&h);
        assert_eq!(missing, vec!["victim_ip", "victim_port"]);
    }
}
