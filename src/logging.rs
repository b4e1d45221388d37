// src/logging.rs
//! Explicitly constructed run logger.
//!
//! A `ScanLogger` is built once at the start of a run and handed to every
//! component that reports progress. Nothing is installed globally, so two
//! scans in the same process (or two tests) can log independently.

use env_logger::Logger;
use log::{Level, LevelFilter, Log, Record};
use std::fmt;
use std::sync::Arc;

const TARGET: &str = "subcollector";

#[derive(Clone, Default)]
pub struct ScanLogger {
    inner: Option<Arc<Logger>>,
}

impl fmt::Debug for ScanLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanLogger")
            .field("enabled", &self.inner.is_some())
            .finish()
    }
}

impl ScanLogger {
    pub fn new(verbose: bool, silent: bool) -> Self {
        let level = if silent {
            LevelFilter::Error
        } else if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };

        let logger = env_logger::Builder::from_default_env()
            .filter_level(level)
            .build();

        Self {
            inner: Some(Arc::new(logger)),
        }
    }

    /// A logger that drops every record.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if let Some(logger) = &self.inner {
            let record = Record::builder()
                .args(args)
                .level(level)
                .target(TARGET)
                .build();
            if logger.enabled(record.metadata()) {
                logger.log(&record);
            }
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn flush(&self) {
        if let Some(logger) = &self.inner {
            logger.flush();
        }
    }
}
