//! Unit tests for log.rs
//!
//! Tests Logger trait, LogEntry, LogSeverity, DefaultLogger and the global logger macros.

use crate::error::Error;
use crate::log::{self, DefaultLogger, LogEntry, LogSeverity, Logger};
use serial_test::serial;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_debug() {
    assert_eq!(format!("{:?}", LogSeverity::Trace), "Trace");
    assert_eq!(format!("{:?}", LogSeverity::Error), "Error");
}

// ============================================================================
// LOG ENTRY TESTS
// ============================================================================

#[test]
fn test_log_entry_creation_with_file_line() {
    let entry = LogEntry {
        severity: LogSeverity::Error,
        timestamp: SystemTime::now(),
        source: "render_test::vulkan".to_string(),
        message: "Vulkan error".to_string(),
        file: Some("vulkan.rs"),
        line: Some(42),
    };

    assert_eq!(entry.severity, LogSeverity::Error);
    assert_eq!(entry.source, "render_test::vulkan");
    assert_eq!(entry.file, Some("vulkan.rs"));
    assert_eq!(entry.line, Some(42));
}

// ============================================================================
// DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_default_logger_all_severities() {
    let logger = DefaultLogger;
    let timestamp = SystemTime::now();

    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        // Both branches: with and without file:line
        logger.log(&LogEntry {
            severity,
            timestamp,
            source: "test".to_string(),
            message: format!("{:?} message", severity),
            file: None,
            line: None,
        });
        logger.log(&LogEntry {
            severity,
            timestamp,
            source: "test".to_string(),
            message: format!("{:?} message with location", severity),
            file: Some("test.rs"),
            line: Some(42),
        });
    }
}

#[test]
fn test_logger_trait_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<DefaultLogger>();
}

// ============================================================================
// GLOBAL LOGGER TESTS
// ============================================================================

/// Logger that records every entry for inspection
#[derive(Clone, Default)]
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

#[test]
#[serial]
fn test_set_logger_receives_macro_output() {
    let capture = CaptureLogger::default();
    log::set_logger(capture.clone());

    crate::render_info!("render_test::test", "hello {}", 7);
    crate::render_error!("render_test::test", "broken {}", "pipe");

    log::reset_logger();

    let entries = capture.entries.lock().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].severity, LogSeverity::Info);
    assert_eq!(entries[0].message, "hello 7");
    assert!(entries[0].file.is_none());
    assert_eq!(entries[1].severity, LogSeverity::Error);
    assert_eq!(entries[1].message, "broken pipe");
    assert!(entries[1].file.is_some());
    assert!(entries[1].line.is_some());
}

#[test]
#[serial]
fn test_render_fail_logs_and_builds_variant() {
    let capture = CaptureLogger::default();
    log::set_logger(capture.clone());

    let err = crate::render_fail!("render_test::test", Compile, "missing entry point '{}'", "main");
    let backend = crate::render_err!("render_test::test", "device lost");

    log::reset_logger();

    assert!(matches!(err, Error::Compile(ref msg) if msg == "missing entry point 'main'"));
    assert!(matches!(backend, Error::BackendError(ref msg) if msg == "device lost"));

    let entries = capture.entries.lock().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.severity == LogSeverity::Error));
}

#[test]
#[serial]
fn test_render_bail_returns_early() {
    fn check(value: u32) -> crate::error::Result<u32> {
        if value == 0 {
            crate::render_bail!("render_test::test", InvalidLayout, "value must be non-zero");
        }
        Ok(value * 2)
    }

    log::set_logger(CaptureLogger::default());
    let failed = check(0);
    let passed = check(4);
    log::reset_logger();

    assert!(matches!(failed, Err(Error::InvalidLayout(_))));
    assert_eq!(passed.unwrap(), 8);
}
