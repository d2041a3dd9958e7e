//! Logger initialization.

use std::io::Write;

use colored::Colorize;
use log::LevelFilter;

use crate::config::LogFormat;

/// Initializes the logger with the specified level and format.
///
/// Configures `env_logger` with custom formatting, either plain text with
/// colors or JSON lines for structured logging. `RUST_LOG` is read first for
/// per-module filtering; the explicit `level` overrides its global level.
///
/// Uses `try_init()` so repeated calls (tests) do not panic.
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();

    builder.filter_level(level);
    // HTTP internals are noisy at debug; keep them at info unless RUST_LOG
    // asks for more.
    builder.filter_module("reqwest", LevelFilter::Info);
    builder.filter_module("hyper", LevelFilter::Info);
    builder.filter_module("misp_ddos", level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{{\"ts\":{},\"level\":\"{}\",\"target\":\"{}\",\"msg\":{}}}",
                    chrono::Utc::now().timestamp_millis(),
                    record.level(),
                    record.target(),
                    serde_json::to_string(&record.args().to_string())
                        .unwrap_or_else(|_| "\"\"".into())
                )
            });
        }
        LogFormat::Plain => {
            builder.format(|buf, record| {
                let level = record.level();
                let colored_level = match level {
                    log::Level::Error => level.to_string().red(),
                    log::Level::Warn => level.to_string().yellow(),
                    log::Level::Info => level.to_string().green(),
                    log::Level::Debug => level.to_string().blue(),
                    log::Level::Trace => level.to_string().purple(),
                };

                writeln!(
                    buf,
                    "{} [{}] {}",
                    record.target().cyan(),
                    colored_level,
                    record.args()
                )
            });
        }
    }

    builder.try_init()
}
