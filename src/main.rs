//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `misp_ddos` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - Exit code mapping (0 success, 1 failure, 130 interrupt)
//!
//! All core functionality is implemented in the library crate.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use tokio_util::sync::CancellationToken;

use misp_ddos::bulk::{run_bulk, BulkOptions};
use misp_ddos::config::{log_level_from_env, LogFormat, LogLevel, Settings};
use misp_ddos::error::ConfigError;
use misp_ddos::export::{export_events, ExportOptions};
use misp_ddos::ingest::csv_template;
use misp_ddos::initialization::init_logger_with;
use misp_ddos::interactive::run_interactive;
use misp_ddos::misp::{HttpMispClient, RetryPolicy, SubmissionClient};
use misp_ddos::schema::Schema;

/// Create and manage DDoS events in a MISP instance.
#[derive(Parser, Debug)]
#[command(name = "misp-ddos", version, about)]
struct Cli {
    /// Path to a .env file with MISP_URL and MISP_API_KEY.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Log level; overrides LOG_LEVEL from the environment.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "plain")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a single event through interactive prompts.
    Interactive,

    /// Upload events from a CSV batch file.
    Bulk {
        /// Path to the batch file.
        csv_file: PathBuf,

        /// Which column set the file uses.
        #[arg(long, value_enum, default_value_t = Schema::default())]
        schema: Schema,

        /// Skip rows that fail validation instead of aborting the batch.
        #[arg(long)]
        skip_invalid: bool,

        /// Stop at the first upload failure.
        #[arg(long)]
        no_continue_on_error: bool,

        /// Validate the file and report; create nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the instance and export matching events as JSON.
    Export {
        /// Destination file; stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Tag the events must carry; repeatable.
        #[arg(long)]
        tag: Vec<String>,

        /// Earliest event date, YYYY-MM-DD.
        #[arg(long)]
        from: Option<String>,

        /// Latest event date, YYYY-MM-DD.
        #[arg(long)]
        to: Option<String>,
    },

    /// Print a CSV template for a batch schema.
    Template {
        #[arg(value_enum, default_value_t = Schema::default())]
        schema: Schema,
    },

    /// Verify connectivity and credentials against the instance.
    TestConnection,
}

fn load_env(env_file: &Option<PathBuf>) -> Result<()> {
    match env_file {
        // An explicitly named file must exist; a silently missing one would
        // make the tool fall back to whatever is in the shell environment.
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::EnvFileNotFound(path.clone()).into());
            }
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }
    Ok(())
}

fn connected_client(settings: &Settings) -> Result<SubmissionClient<HttpMispClient>> {
    let api = HttpMispClient::new(settings).context("failed to build HTTP client")?;
    let retry = RetryPolicy::new(
        settings.max_attempts,
        misp_ddos::config::BACKOFF_FACTOR_SECS,
    );
    Ok(SubmissionClient::new(api, settings.misp_url.clone(), retry))
}

async fn run(cli: Cli) -> Result<i32> {
    // Template needs no configuration at all; everything else talks to MISP.
    if let Command::Template { schema } = &cli.command {
        print!("{}", csv_template(*schema));
        return Ok(0);
    }

    let settings = Settings::from_env().context("configuration error")?;
    debug!("Loaded settings: {settings:?}");
    let client = connected_client(&settings)?;

    match cli.command {
        Command::Template { .. } => unreachable!("handled above"),

        Command::Interactive => run_interactive(&client).await,

        Command::Bulk {
            csv_file,
            schema,
            skip_invalid,
            no_continue_on_error,
            dry_run,
        } => {
            let options = BulkOptions {
                csv_file,
                schema,
                skip_invalid,
                continue_on_error: !no_continue_on_error,
                dry_run,
            };

            let cancel = CancellationToken::new();
            let ctrl_c_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nInterrupt received, finishing current event...");
                    ctrl_c_token.cancel();
                }
            });

            let summary = run_bulk(&client, &options, settings.max_file_size_mb, &cancel)
                .await
                .context("bulk upload failed")?;
            Ok(summary.exit_code())
        }

        Command::Export {
            output,
            tag,
            from,
            to,
        } => {
            let options = ExportOptions {
                output,
                tags: tag,
                from,
                to,
            };
            let count = export_events(&client, &options).await?;
            println!("Exported {count} events");
            Ok(0)
        }

        Command::TestConnection => {
            println!(
                "Testing connection to {} (verify_ssl: {}, timeout: {}s)",
                settings.misp_url,
                settings.verify_ssl,
                settings.timeout.as_secs()
            );
            match client.test_connection().await {
                Ok(version) => {
                    println!("Connected (MISP {version})");
                    Ok(0)
                }
                Err(e) => {
                    eprintln!("Connection test failed: {e}");
                    eprintln!(
                        "Check that MISP_URL is reachable from this host and that \
                         MISP_API_KEY is an active auth key for it."
                    );
                    Ok(1)
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    load_env(&cli.env_file).unwrap_or_else(|e| {
        eprintln!("misp-ddos error: {e:#}");
        process::exit(1);
    });

    let level = cli
        .log_level
        .map(log::LevelFilter::from)
        .unwrap_or_else(log_level_from_env);
    if let Err(e) = init_logger_with(level, cli.log_format) {
        eprintln!("misp-ddos error: failed to initialize logger: {e}");
        process::exit(1);
    }

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("misp-ddos error: {e:#}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_bulk_flags() {
        let cli = Cli::try_parse_from([
            "misp-ddos",
            "bulk",
            "events.csv",
            "--schema",
            "playbook",
            "--skip-invalid",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Command::Bulk {
                csv_file,
                schema,
                skip_invalid,
                no_continue_on_error,
                dry_run,
            } => {
                assert_eq!(csv_file, PathBuf::from("events.csv"));
                assert_eq!(schema, Schema::Playbook);
                assert!(skip_invalid);
                assert!(!no_continue_on_error);
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_defaults_to_annotation_schema() {
        let cli = Cli::try_parse_from(["misp-ddos", "bulk", "events.csv"]).unwrap();
        match cli.command {
            Command::Bulk { schema, .. } => assert_eq!(schema, Schema::Annotation),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_requires_a_subcommand() {
        assert!(Cli::try_parse_from(["misp-ddos"]).is_err());
    }

    #[test]
    fn cli_parses_repeated_export_tags() {
        let cli = Cli::try_parse_from([
            "misp-ddos",
            "export",
            "--tag",
            "tlp:amber",
            "--tag",
            "misp-event-type:incident",
            "--from",
            "2024-01-01",
        ])
        .unwrap();
        match cli.command {
            Command::Export { tag, from, .. } => {
                assert_eq!(tag.len(), 2);
                assert_eq!(from.as_deref(), Some("2024-01-01"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
