//! Event export: search the instance and write matching events as JSON.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::info;

use crate::misp::payload::is_safe_tag;
use crate::misp::{MispApi, SearchQuery, SubmissionClient};

/// Options for the `export` command.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Destination file; stdout when absent.
    pub output: Option<PathBuf>,
    pub tags: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn check_date(label: &str, value: &Option<String>) -> Result<()> {
    if let Some(v) = value {
        NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .with_context(|| format!("--{label} must be YYYY-MM-DD, got '{v}'"))?;
    }
    Ok(())
}

/// Searches for events and writes them as a pretty-printed JSON array.
/// Returns how many events were exported.
pub async fn export_events<A: MispApi>(
    client: &SubmissionClient<A>,
    options: &ExportOptions,
) -> Result<usize> {
    for tag in &options.tags {
        if !is_safe_tag(tag) {
            bail!("Invalid tag '{tag}': only letters, digits and :=\"-_. are allowed");
        }
    }
    check_date("from", &options.from)?;
    check_date("to", &options.to)?;

    let query = SearchQuery {
        tags: options.tags.clone(),
        from: options.from.clone(),
        to: options.to.clone(),
    };
    let events = client.search(&query).await.context("event search failed")?;

    let mut writer: BufWriter<Box<dyn Write>> = match &options.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            BufWriter::new(Box::new(file))
        }
        None => BufWriter::new(Box::new(io::stdout())),
    };
    serde_json::to_writer_pretty(&mut writer, &events).context("failed to serialize events")?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    match &options.output {
        Some(path) => info!("Exported {} events to {}", events.len(), path.display()),
        None => info!("Exported {} events to stdout", events.len()),
    }
    Ok(events.len())
}
