//! Command-line tool for creating DDoS events in a MISP instance, one at a
//! time interactively or in bulk from CSV batch files.
//!
//! The pipeline is strict about what reaches the network: CSV rows become
//! [`event::EventRecord`]s only after full validation, and the submission
//! client validates once more before building the request payload.

pub mod bulk;
pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod ingest;
pub mod initialization;
pub mod interactive;
pub mod misp;
pub mod schema;
pub mod validate;

pub use bulk::{run_bulk, BulkOptions, BulkSummary};
pub use config::{LogFormat, LogLevel, Settings};
pub use error::{ApiError, ClientError, ConfigError, FileError, IngestError, ValidationError};
pub use event::{AttackType, EventRecord, Target, Tlp};
pub use export::{export_events, ExportOptions};
pub use ingest::{csv_template, parse_csv_file, ValidationOutcome};
pub use initialization::init_logger_with;
pub use misp::{HttpMispClient, MispApi, RetryPolicy, SubmissionClient};
pub use schema::Schema;
