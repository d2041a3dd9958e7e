//! Bulk upload orchestration: parse a batch file, submit events one at a
//! time, account for every record.
//!
//! Uploads are deliberately sequential. MISP instances are routinely sized
//! for analyst traffic, not parallel ingest, and per-record accounting plus
//! clean interruption both get much simpler this way.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use colored::Colorize;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;
use crate::event::EventRecord;
use crate::ingest::{parse_csv_file, ValidationOutcome};
use crate::misp::client::{SubmissionClient, SubmittedEvent};
use crate::misp::MispApi;
use crate::schema::Schema;

/// Options for the `bulk` command.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub csv_file: PathBuf,
    pub schema: Schema,
    /// Collect invalid rows and continue parsing instead of aborting.
    pub skip_invalid: bool,
    /// Keep uploading after a record fails.
    pub continue_on_error: bool,
    /// Validate and report only; nothing is sent.
    pub dry_run: bool,
}

/// The fate of one record's upload.
#[derive(Debug)]
pub struct SubmissionOutcome {
    /// Position in the upload sequence, 1-based.
    pub index: usize,
    pub event_name: String,
    pub result: Result<SubmittedEvent, String>,
    pub duration: Duration,
}

/// Accounting for a whole upload run.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub outcomes: Vec<SubmissionOutcome>,
    pub duration: Duration,
    /// True when the run stopped early, either on interrupt or on the first
    /// failure without `continue_on_error`.
    pub aborted: bool,
}

impl BatchResult {
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }
}

/// Everything the `bulk` command learned, for reporting and the exit code.
#[derive(Debug)]
pub struct BulkSummary {
    pub total_rows: usize,
    pub invalid_rows: Vec<(usize, String)>,
    /// `None` on a dry run.
    pub batch: Option<BatchResult>,
    pub interrupted: bool,
}

impl BulkSummary {
    /// 0 when every row validated and every upload succeeded, 130 on
    /// interrupt, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            return 130;
        }
        let upload_failed = self
            .batch
            .as_ref()
            .is_some_and(|b| b.failures() > 0 || b.aborted);
        if !self.invalid_rows.is_empty() || upload_failed {
            1
        } else {
            0
        }
    }
}

/// Uploads `events` sequentially, checking for cancellation between records.
pub async fn upload_events<A: MispApi>(
    client: &SubmissionClient<A>,
    events: &[EventRecord],
    continue_on_error: bool,
    cancel: &CancellationToken,
) -> BatchResult {
    let started = Instant::now();
    let total = events.len();
    let mut result = BatchResult::default();

    for (i, event) in events.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(
                "Interrupted after {} of {total} events; reporting partial results",
                result.outcomes.len()
            );
            result.aborted = true;
            break;
        }

        let index = i + 1;
        info!("[{index}/{total}] Creating event '{}'", event.event_name);
        let record_started = Instant::now();
        let outcome = match client.submit(event).await {
            Ok(submitted) => {
                info!("[{index}/{total}] Created: {}", submitted.url);
                Ok(submitted)
            }
            Err(e) => {
                error!("[{index}/{total}] Failed to create '{}': {e}", event.event_name);
                Err(e.to_string())
            }
        };
        let failed = outcome.is_err();
        result.outcomes.push(SubmissionOutcome {
            index,
            event_name: event.event_name.clone(),
            result: outcome,
            duration: record_started.elapsed(),
        });

        if failed && !continue_on_error {
            warn!("Stopping after first failure");
            result.aborted = true;
            break;
        }
    }

    result.duration = started.elapsed();
    result
}

/// Runs the full `bulk` pipeline: parse, optionally upload, summarize.
pub async fn run_bulk<A: MispApi>(
    client: &SubmissionClient<A>,
    options: &BulkOptions,
    max_file_size_mb: u64,
    cancel: &CancellationToken,
) -> Result<BulkSummary, IngestError> {
    let outcome = parse_csv_file(
        &options.csv_file,
        options.schema,
        options.skip_invalid,
        max_file_size_mb,
    )?;
    report_validation(&outcome, options.dry_run);

    if options.dry_run {
        return Ok(BulkSummary {
            total_rows: outcome.total_rows,
            invalid_rows: outcome.invalid_rows,
            batch: None,
            interrupted: false,
        });
    }

    let batch = upload_events(
        client,
        &outcome.valid_events,
        options.continue_on_error,
        cancel,
    )
    .await;
    let interrupted = cancel.is_cancelled();
    report_batch(&batch);

    Ok(BulkSummary {
        total_rows: outcome.total_rows,
        invalid_rows: outcome.invalid_rows,
        batch: Some(batch),
        interrupted,
    })
}

fn report_validation(outcome: &ValidationOutcome, dry_run: bool) {
    let mode = if dry_run { "Dry run: " } else { "" };
    println!(
        "{mode}{} of {} rows valid",
        outcome.valid_events.len().to_string().green(),
        outcome.total_rows
    );
    for (row, reason) in &outcome.invalid_rows {
        println!("  {} row {row}: {reason}", "skipped".yellow());
    }
}

fn report_batch(batch: &BatchResult) {
    println!(
        "\n{}: {} succeeded, {} failed in {:.1}s",
        if batch.failures() == 0 && !batch.aborted {
            "Upload complete".green()
        } else {
            "Upload finished with errors".red()
        },
        batch.successes(),
        batch.failures(),
        batch.duration.as_secs_f64()
    );
    for outcome in &batch.outcomes {
        match &outcome.result {
            Ok(submitted) => println!(
                "  {} [{}] {} -> {}",
                "ok".green(),
                outcome.index,
                outcome.event_name,
                submitted.url
            ),
            Err(reason) => println!(
                "  {} [{}] {}: {}",
                "failed".red(),
                outcome.index,
                outcome.event_name,
                reason
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::error::ApiError;
    use crate::event::{Target, Tlp};
    use crate::misp::payload::EventPayload;
    use crate::misp::retry::RetryPolicy;
    use crate::misp::{CreatedEvent, SearchQuery};

    /// Replays a fixed sequence of responses to `create_event`.
    struct ScriptedApi {
        script: Mutex<VecDeque<Result<CreatedEvent, ApiError>>>,
    }

    impl ScriptedApi {
        fn new(script: Vec<Result<CreatedEvent, ApiError>>) -> Self {
            ScriptedApi {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl crate::misp::MispApi for ScriptedApi {
        async fn create_event(&self, _payload: &EventPayload) -> Result<CreatedEvent, ApiError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected create_event call"))
        }

        async fn server_version(&self) -> Result<String, ApiError> {
            Ok("2.4.190".into())
        }

        async fn search_events(&self, _query: &SearchQuery) -> Result<Vec<Value>, ApiError> {
            Ok(vec![])
        }
    }

    fn ok(id: &str) -> Result<CreatedEvent, ApiError> {
        Ok(CreatedEvent {
            id: id.into(),
            uuid: format!("uuid-{id}"),
        })
    }

    fn fail() -> Result<CreatedEvent, ApiError> {
        Err(ApiError::Status {
            status: 403,
            body: "forbidden".into(),
        })
    }

    fn events(n: usize) -> Vec<EventRecord> {
        (1..=n)
            .map(|i| EventRecord {
                event_name: format!("Event {i}"),
                event_date: "2024-01-15".into(),
                attacker_ips: vec!["192.0.2.1".parse().unwrap()],
                target: Target::Destinations {
                    ips: vec![],
                    ports: vec![],
                },
                annotation: "note".into(),
                tlp: Tlp::Green,
            })
            .collect()
    }

    fn client(script: Vec<Result<CreatedEvent, ApiError>>) -> SubmissionClient<ScriptedApi> {
        SubmissionClient::new(
            ScriptedApi::new(script),
            "https://misp.example.org",
            RetryPolicy::new(1, 0),
        )
    }

    #[tokio::test]
    async fn partial_failure_accounts_for_every_record() {
        let c = client(vec![ok("1"), fail(), ok("3")]);
        let batch = upload_events(&c, &events(3), true, &CancellationToken::new()).await;
        assert_eq!(batch.outcomes.len(), 3);
        assert_eq!(batch.successes(), 2);
        assert_eq!(batch.failures(), 1);
        assert!(!batch.aborted);
        assert!(batch.outcomes[1].result.is_err());
        assert_eq!(batch.outcomes[2].index, 3);
    }

    #[tokio::test]
    async fn stops_on_first_failure_without_continue_on_error() {
        let c = client(vec![ok("1"), fail()]);
        let batch = upload_events(&c, &events(3), false, &CancellationToken::new()).await;
        assert_eq!(batch.outcomes.len(), 2);
        assert!(batch.aborted);
    }

    #[tokio::test]
    async fn cancellation_stops_between_records() {
        let token = CancellationToken::new();
        token.cancel();
        let c = client(vec![]);
        let batch = upload_events(&c, &events(3), true, &token).await;
        assert!(batch.outcomes.is_empty());
        assert!(batch.aborted);
    }

    #[test]
    fn exit_code_reflects_outcomes() {
        let clean = BulkSummary {
            total_rows: 2,
            invalid_rows: vec![],
            batch: Some(BatchResult::default()),
            interrupted: false,
        };
        assert_eq!(clean.exit_code(), 0);

        let with_invalid = BulkSummary {
            total_rows: 2,
            invalid_rows: vec![(2, "bad ip".into())],
            batch: Some(BatchResult::default()),
            interrupted: false,
        };
        assert_eq!(with_invalid.exit_code(), 1);

        let mut failed_batch = BatchResult::default();
        failed_batch.outcomes.push(SubmissionOutcome {
            index: 1,
            event_name: "Event 1".into(),
            result: Err("boom".into()),
            duration: Duration::ZERO,
        });
        let with_failure = BulkSummary {
            total_rows: 1,
            invalid_rows: vec![],
            batch: Some(failed_batch),
            interrupted: false,
        };
        assert_eq!(with_failure.exit_code(), 1);

        let interrupted = BulkSummary {
            total_rows: 1,
            invalid_rows: vec![],
            batch: Some(BatchResult::default()),
            interrupted: true,
        };
        assert_eq!(interrupted.exit_code(), 130);
    }

    #[test]
    fn dry_run_exit_code_tracks_validation_only() {
        let clean = BulkSummary {
            total_rows: 3,
            invalid_rows: vec![],
            batch: None,
            interrupted: false,
        };
        assert_eq!(clean.exit_code(), 0);

        let dirty = BulkSummary {
            total_rows: 3,
            invalid_rows: vec![(4, "bad".into())],
            batch: None,
            interrupted: false,
        };
        assert_eq!(dirty.exit_code(), 1);
    }
}
