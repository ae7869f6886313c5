//! Logging setup for the composition root
//!
//! Components log through `tracing`; the application builds one subscriber
//! from its `AppPaths` and installs it. Events go to `<base>/snoopy.log` and,
//! optionally, the terminal.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{AppPaths, SnoopyConfig};

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter directive, e.g. `debug` or `snoopy=trace`
    pub level: Option<String>,
    /// Use `debug` instead of `info` when no level is given
    pub verbose: bool,
    /// Also log to stdout
    pub terminal: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: None,
            verbose: false,
            terminal: true,
        }
    }
}

impl LogOptions {
    pub fn from_config(config: &SnoopyConfig) -> Self {
        Self {
            level: config.log_level.clone(),
            verbose: false,
            terminal: config.terminal_log.unwrap_or(true),
        }
    }

    fn directive(&self) -> &str {
        match &self.level {
            Some(level) => level,
            None if self.verbose => "debug",
            None => "info",
        }
    }
}

/// Build the subscriber without installing it
pub fn subscriber(
    paths: &AppPaths,
    options: &LogOptions,
) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    paths.ensure()?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log())?;

    let filter = EnvFilter::try_new(options.directive())?;
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false);
    let terminal_layer = options.terminal.then(|| fmt::layer());

    Ok(tracing_subscriber::registry()
        .with(file_layer)
        .with(terminal_layer)
        .with(filter))
}

/// Build the subscriber and install it as the global default
pub fn init(paths: &AppPaths, options: &LogOptions) -> anyhow::Result<()> {
    subscriber(paths, options)?.try_init()?;
    tracing::debug!("Logging to {}", paths.log().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteStore;

    fn quiet(level: &str) -> LogOptions {
        LogOptions {
            level: Some(level.to_string()),
            verbose: false,
            terminal: false,
        }
    }

    #[test]
    fn test_directive() {
        assert_eq!(LogOptions::default().directive(), "info");
        let verbose = LogOptions {
            verbose: true,
            ..LogOptions::default()
        };
        assert_eq!(verbose.directive(), "debug");
        assert_eq!(quiet("warn").directive(), "warn");
    }

    #[test]
    fn test_events_reach_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let subscriber = subscriber(&paths, &quiet("info")).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("scan started");
            tracing::debug!("filtered out");
        });

        let log = std::fs::read_to_string(paths.log()).unwrap();
        assert!(log.contains("scan started"));
        assert!(!log.contains("filtered out"));
    }

    #[test]
    fn test_store_logs_under_database_span() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let subscriber = subscriber(&paths, &quiet("debug")).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            let store = SqliteStore::open_in(&paths).unwrap();
            assert!(store.file_get_by_path("/missing/file").unwrap().is_none());
        });

        let log = std::fs::read_to_string(paths.log()).unwrap();
        assert!(log.contains("Initialize fresh database"));
        assert!(log.contains("\"/missing/file\" was not found"));
        assert!(log.contains("database{"));
    }

    #[test]
    fn test_invalid_directive() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        assert!(subscriber(&paths, &quiet("snoopy=loudest")).is_err());
    }

    #[test]
    fn test_options_from_config() {
        let config = SnoopyConfig {
            base_dir: None,
            log_level: Some("trace".to_string()),
            terminal_log: Some(false),
        };
        let options = LogOptions::from_config(&config);
        assert_eq!(options.directive(), "trace");
        assert!(!options.terminal);
    }
}
