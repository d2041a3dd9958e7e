//! Batch CSV ingestion: file preconditions, header check, streaming row
//! validation.
//!
//! The file is streamed through the CSV reader rather than slurped, so the
//! size cap is the only memory bound that matters. Lines starting with `#`
//! and blank lines are skipped before parsing and do not advance row
//! numbering.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::{ErrorKind, ReaderBuilder};
use log::{debug, warn};

use crate::error::{FileError, IngestError};
use crate::event::EventRecord;
use crate::schema::Schema;
use crate::validate::{validate_row, RawRow};

/// Result of parsing a batch file.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    /// Records that passed validation, in file order.
    pub valid_events: Vec<EventRecord>,
    /// Rejected rows as `(row_number, reason)`. Only populated when
    /// `skip_invalid` is set; otherwise the first bad row aborts the parse.
    pub invalid_rows: Vec<(usize, String)>,
    /// Data rows seen, valid or not. Excludes the header, comments and
    /// blank lines.
    pub total_rows: usize,
}

/// Checks file-level preconditions before any parsing.
pub fn check_file(path: &Path, max_file_size_mb: u64) -> Result<(), FileError> {
    if !path.exists() {
        return Err(FileError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(FileError::NotAFile(path.to_path_buf()));
    }
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(FileError::NotCsv(path.to_path_buf()));
    }

    let size = path.metadata().map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        return Err(FileError::Empty(path.to_path_buf()));
    }
    let max_bytes = max_file_size_mb * 1024 * 1024;
    if size > max_bytes {
        return Err(FileError::TooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: max_file_size_mb,
        });
    }
    Ok(())
}

/// Parses and validates a batch CSV file into [`EventRecord`]s.
///
/// Row numbers are 1-based with the header as row 1, so the first data row
/// reports as row 2. With `skip_invalid`, bad rows are collected into
/// [`ValidationOutcome::invalid_rows`] and parsing continues; without it the
/// first bad row fails the whole batch.
pub fn parse_csv_file(
    path: &Path,
    schema: Schema,
    skip_invalid: bool,
    max_file_size_mb: u64,
) -> Result<ValidationOutcome, IngestError> {
    check_file(path, max_file_size_mb)?;

    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(BufReader::new(file));

    let header: Vec<String> = reader
        .headers()
        .map_err(map_csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let missing = schema.missing_columns(&header);
    if !missing.is_empty() {
        return Err(IngestError::Schema { missing });
    }

    let mut outcome = ValidationOutcome::default();
    let mut row_number = 1; // header

    for record in reader.records() {
        let record = record.map_err(map_csv_error)?;
        row_number += 1;
        outcome.total_rows += 1;

        let row: RawRow = header
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();

        match validate_row(&row, row_number, schema) {
            Ok(event) => {
                debug!("Row {row_number}: validated '{}'", event.event_name);
                outcome.valid_events.push(event);
            }
            Err(err) if skip_invalid => {
                warn!("Skipping invalid row {row_number}: {err}");
                outcome.invalid_rows.push((row_number, err.to_string()));
            }
            Err(err) => {
                return Err(IngestError::Row {
                    row: row_number,
                    source: err,
                });
            }
        }
    }

    Ok(outcome)
}

fn map_csv_error(e: csv::Error) -> IngestError {
    match e.kind() {
        ErrorKind::Utf8 { .. } => IngestError::Encoding(e.to_string()),
        _ => IngestError::Malformed(e.to_string()),
    }
}

/// Renders a template CSV for `schema`: header, a comment explaining the
/// columns, and one example data row.
pub fn csv_template(schema: Schema) -> String {
    match schema {
        Schema::Playbook => "\
date,event_name,attack_type,attacker_ips,attacker_ports,victim_ip,victim_port,description,tlp
# attack_type: direct-flood | amplification | both. Separate multiple IPs/ports with ';'.
2024-01-15,DNS amplification against web tier,amplification,203.0.113.5;203.0.113.6,53;53,198.51.100.7,443,Reflected DNS flood saturating uplink,green
"
        .to_string(),
        Schema::Annotation => "\
date,event_name,attacker_ips,annotation_text,destination_ips,destination_ports,tlp
# Separate multiple IPs/ports with ';'. destination_ips/ports and tlp are optional.
2024-01-15,SYN flood against customer portal,192.0.2.10;192.0.2.11,Sustained SYN flood from botnet,198.51.100.20,443,amber
"
        .to_string(),
    }
}
