//! tracing subscriber setup
//!
//! Transfer events go to a rolling file (text or JSON) and, in text mode,
//! to stdout as well. `RUST_LOG` overrides the configured directives.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Unknown names fall back to a single file.
pub fn rotation(name: &str) -> Rotation {
    match name {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// Default filter: the crate level, with sqlx at its own level.
pub fn filter_directives(config: &AppConfig) -> String {
    format!("{},sqlx={}", config.log_level, config.sqlx_log_level)
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let appender = RollingFileAppender::new(
        rotation(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let (json_file, text_file) = if config.use_json {
        let layer = fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(writer);
        (Some(layer), None)
    } else {
        let layer = fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer);
        (None, Some(layer))
    };
    let stdout = (!config.use_json).then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_file)
        .with(text_file)
        .with(stdout)
        .init();

    guard
}
