//! Logging Infrastructure
//!
//! `EnvFilter`-driven subscriber with optional JSON output and an optional
//! daily rolling file.

use std::path::Path;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "market_server=info,tower_http=info";

/// Build the env filter: `RUST_LOG` wins, then the configured level, then the default
fn env_filter(log_level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match log_level {
        Some(level) => EnvFilter::new(format!("market_server={level},tower_http={level}")),
        None => EnvFilter::new(DEFAULT_FILTER),
    })
}

/// Initialize the global subscriber. Safe to call more than once.
pub fn init_logger(log_level: Option<&str>, json: bool, log_dir: Option<&str>) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true);

    let file_dir = log_dir.map(Path::new).filter(|p| p.exists());

    let result = match (file_dir, json) {
        (Some(dir), true) => builder
            .json()
            .with_writer(tracing_appender::rolling::daily(dir, "market-server"))
            .try_init(),
        (Some(dir), false) => builder
            .with_ansi(false)
            .with_writer(tracing_appender::rolling::daily(dir, "market-server"))
            .try_init(),
        (None, true) => builder.json().try_init(),
        (None, false) => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logger already initialized: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logger(Some("debug"), false, None);
        init_logger(None, true, Some("/definitely/not/here"));
    }
}
