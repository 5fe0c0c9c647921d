//! Integration tests for the logger
//!
//! These tests verify:
//! - Per-thread FIFO output to a file
//! - Once and interval rate limiting
//! - Level changes judged at drain time
//! - Header patterns, message filters and log callback offsets
//! - Overflow episodes under the drop policy
//! - Log file switching, closing, failures and rotation

use deferred_logger::core::call_site::CallSiteMeta;
use deferred_logger::prelude::*;
use deferred_logger::{
    debug, error, escape_line_breaks, info, info_at, info_every, info_once, log_once, warn,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("Failed to read log file")
        .lines()
        .map(str::to_string)
        .collect()
}

/// Logger writing bare message bodies to `file`
fn file_logger(file: &Path) -> Logger {
    Logger::builder()
        .level(LogLevel::Debug)
        .header_pattern("")
        .log_file(file, true)
        .build()
        .expect("Failed to build logger")
}

#[derive(Debug, Clone, PartialEq)]
struct Captured {
    location: String,
    thread_name: String,
    message: String,
    body_pos: usize,
    file_pos: Option<u64>,
}

fn capture(logger: &Logger, min_level: LogLevel) -> Arc<Mutex<Vec<Captured>>> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    logger.set_log_callback(
        move |msg| {
            sink.lock().unwrap().push(Captured {
                location: msg.location.to_string(),
                thread_name: msg.thread_name.to_string(),
                message: msg.message.to_string(),
                body_pos: msg.body_pos,
                file_pos: msg.file_pos,
            })
        },
        min_level,
    );
    captured
}

fn bodies(captured: &Mutex<Vec<Captured>>) -> Vec<String> {
    captured
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.message[c.body_pos..].to_string())
        .collect()
}

#[test]
fn test_single_thread_fifo_to_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("fifo.log");
    let logger = file_logger(&log_file);

    for i in 0..500 {
        info!(logger, "message {}", i);
    }
    assert_eq!(logger.poll(true).unwrap(), 500);

    let expected: Vec<String> = (0..500).map(|i| format!("message {}", i)).collect();
    assert_eq!(read_lines(&log_file), expected);
    assert_eq!(logger.metrics().total_logged(), 500);
}

#[test]
fn test_forced_poll_drains_everything() {
    let logger = Logger::builder().stdout(false).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    for i in 0..10_000u32 {
        info!(logger, "{}", i);
    }
    logger.poll(true).unwrap();
    assert_eq!(captured.lock().unwrap().len(), 10_000);
    assert_eq!(logger.poll(true).unwrap(), 0);
}

#[test]
fn test_once_renders_first_record_only() {
    let logger = Logger::builder().stdout(false).level(LogLevel::Info).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    let emit = |i: u32| log_once!(logger, LogLevel::Debug, "once {}", i);

    // disabled: nothing queued, nothing consumed
    emit(0);
    logger.poll(true).unwrap();
    assert!(captured.lock().unwrap().is_empty());

    logger.set_level(LogLevel::Debug);
    for i in 1..5 {
        emit(i);
    }
    logger.poll(true).unwrap();

    logger.set_level(LogLevel::Info);
    emit(5);
    logger.set_level(LogLevel::Debug);
    for i in 6..10 {
        emit(i);
    }
    logger.poll(true).unwrap();

    assert_eq!(bodies(&captured), vec!["once 1".to_string()]);
}

#[test]
fn test_interval_limits_emission_rate() {
    let logger = Logger::builder().stdout(false).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    // one minute window: a burst collapses to its first record
    for i in 0..1000 {
        info_every!(logger, 60_000_000_000u64, "burst {}", i);
    }
    logger.poll(true).unwrap();
    assert_eq!(bodies(&captured), vec!["burst 0".to_string()]);

    // 1 ms window with calls spaced further apart: all of them render
    captured.lock().unwrap().clear();
    for i in 0..3 {
        info_every!(logger, 1_000_000u64, "spaced {}", i);
        std::thread::sleep(Duration::from_millis(5));
    }
    logger.poll(true).unwrap();
    assert_eq!(bodies(&captured).len(), 3);
}

#[test]
fn test_level_change_applies_to_later_calls() {
    let logger = Logger::builder().stdout(false).level(LogLevel::Info).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    debug!(logger, "before change");
    logger.poll(true).unwrap();

    logger.set_level(LogLevel::Debug);
    debug!(logger, "after change");
    logger.poll(true).unwrap();

    assert_eq!(bodies(&captured), vec!["after change".to_string()]);
}

#[test]
fn test_level_is_judged_at_drain_time() {
    let logger = Logger::builder().stdout(false).level(LogLevel::Debug).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    debug!(logger, "queued while enabled");
    warn!(logger, "still enabled");
    logger.set_level(LogLevel::Warn);
    logger.poll(true).unwrap();

    assert_eq!(bodies(&captured), vec!["still enabled".to_string()]);
    assert_eq!(logger.metrics().suppressed_count(), 1);
}

#[test]
fn test_header_pattern_change() {
    let logger = Logger::builder().stdout(false).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    logger.set_thread_name("net");
    logger.set_header_pattern("<{l}|{t}> ");
    info!(logger, "first");
    logger.poll(true).unwrap();

    logger.set_header_pattern("[{l:^5}] ");
    error!(logger, "second");
    logger.poll(true).unwrap();

    let captured = captured.lock().unwrap();
    assert_eq!(captured[0].message, "<INF|net> first");
    assert_eq!(captured[0].body_pos, "<INF|net> ".len());
    assert_eq!(captured[1].message, "[ ERR ] second");
    assert_eq!(captured[1].thread_name, "net");
}

#[test]
fn test_default_header_shape() {
    let logger = Logger::builder().stdout(false).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    logger.set_thread_name("main");
    let line = line!() + 1;
    info!(logger, "payload");
    logger.poll(true).unwrap();

    let captured = captured.lock().unwrap();
    let message = &captured[0].message;
    let location = format!("integration_tests.rs:{}", line);
    assert_eq!(captured[0].location, location);
    // {HMSf} is "HH:MM:SS.ffffff"
    assert_eq!(message.as_bytes()[2], b':');
    assert_eq!(message.as_bytes()[8], b'.');
    assert!(message.contains(&format!(" {:<16} INF[main  ] payload", location)));
}

#[test]
fn test_location_override() {
    let logger = Logger::builder().stdout(false).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);
    info_at!(logger, "orders::matcher", "crossed");
    logger.poll(true).unwrap();
    assert_eq!(captured.lock().unwrap()[0].location, "orders::matcher");
}

#[test]
fn test_message_filter_escapes_line_breaks() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("filter.log");
    let logger = file_logger(&log_file);
    logger.set_message_filter(escape_line_breaks);

    info!(logger, "Line breaks: {}", "ABC\n\nXYZ");
    info!(logger, "ABC XYZ");
    logger.poll(true).unwrap();

    assert_eq!(
        read_lines(&log_file),
        vec!["Line breaks: ABC_\\n__\\n_XYZ".to_string(), "ABC XYZ".to_string()]
    );
}

#[test]
fn test_message_filter_replacement_reaches_callback() {
    let logger = Logger::builder().stdout(false).header_pattern("{l} ").build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);
    logger.set_message_filter(|line| Some(line.to_uppercase()));

    info!(logger, "quiet words");
    logger.poll(true).unwrap();

    let captured = captured.lock().unwrap();
    assert_eq!(captured[0].message, "INF QUIET WORDS");
    assert_eq!(&captured[0].message[captured[0].body_pos..], "QUIET WORDS");
}

#[test]
fn test_filter_rewriting_header_keeps_body_offset() {
    let logger = Logger::builder().stdout(false).header_pattern("[{t}] ").build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);
    logger.set_message_filter(escape_line_breaks);
    logger.set_thread_name("io\nworker");

    info!(logger, "payload {}", "a\nb");
    logger.poll(true).unwrap();

    let captured = captured.lock().unwrap();
    assert_eq!(captured[0].message, "[io_\\n_worker] payload a_\\n_b");
    assert_eq!(&captured[0].message[captured[0].body_pos..], "payload a_\\n_b");
}

#[test]
fn test_callback_file_positions() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("positions.log");
    let logger = file_logger(&log_file);
    let captured = capture(&logger, LogLevel::Debug);

    info!(logger, "a");
    info!(logger, "bb");
    info!(logger, "ccc");
    logger.poll(true).unwrap();

    let positions: Vec<Option<u64>> = captured.lock().unwrap().iter().map(|c| c.file_pos).collect();
    assert_eq!(positions, vec![Some(0), Some(2), Some(5)]);
    assert_eq!(fs::read_to_string(&log_file).unwrap(), "a\nbb\nccc\n");
}

#[test]
fn test_callback_level_and_file_level() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("levels.log");
    let logger = file_logger(&log_file);
    logger.set_file_level(LogLevel::Warn);
    let captured = capture(&logger, LogLevel::Info);

    debug!(logger, "debug");
    info!(logger, "info");
    warn!(logger, "warn");
    logger.poll(true).unwrap();

    assert_eq!(read_lines(&log_file), vec!["warn".to_string()]);
    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 2);
    // not written, but reports where it would have gone
    assert_eq!(captured[0].file_pos, Some(0));
    assert_eq!(captured[1].file_pos, Some(0));
}

#[test]
fn test_callback_without_file() {
    let logger = Logger::builder().stdout(false).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);
    info!(logger, "no file");
    logger.poll(true).unwrap();
    assert_eq!(captured.lock().unwrap()[0].file_pos, None);
}

#[test]
fn test_drop_policy_overflow_episodes() {
    let episodes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&episodes);
    // 14-byte record header + 9-byte u64 argument = 32-byte frames, 8 per queue
    let logger = Logger::builder()
        .stdout(false)
        .queue_capacity(256)
        .on_queue_full(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    for i in 0..20u64 {
        info!(logger, "{}", i);
    }
    assert_eq!(episodes.load(Ordering::SeqCst), 1);
    logger.poll(true).unwrap();
    assert_eq!(captured.lock().unwrap().len(), 8);
    assert_eq!(logger.metrics().dropped_count(), 12);

    for i in 0..20u64 {
        info!(logger, "{}", i);
    }
    assert_eq!(episodes.load(Ordering::SeqCst), 2);
    assert_eq!(logger.metrics().queue_full_events(), 2);
}

#[test]
fn test_switch_and_close_log_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let first = temp_dir.path().join("first.log");
    let second = temp_dir.path().join("nested/dir/second.log");
    let logger = file_logger(&first);

    info!(logger, "to first");
    logger.poll(true).unwrap();

    logger.set_log_file(&second, false).unwrap();
    assert_eq!(logger.log_target(), SinkTarget::File(second.clone()));
    info!(logger, "to second");
    logger.poll(true).unwrap();

    logger.close_log_file().unwrap();
    assert_eq!(logger.log_target(), SinkTarget::Disabled);
    info!(logger, "nowhere");
    logger.poll(true).unwrap();

    assert_eq!(read_lines(&first), vec!["to first".to_string()]);
    assert_eq!(read_lines(&second), vec!["to second".to_string()]);
}

#[test]
fn test_append_reports_existing_offset() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("append.log");
    fs::write(&log_file, "old\n").unwrap();

    let logger = Logger::builder()
        .header_pattern("")
        .log_file(&log_file, false)
        .build()
        .unwrap();
    let captured = capture(&logger, LogLevel::Debug);
    info!(logger, "new");
    logger.poll(true).unwrap();

    assert_eq!(captured.lock().unwrap()[0].file_pos, Some(4));
    assert_eq!(read_lines(&log_file), vec!["old".to_string(), "new".to_string()]);
}

#[test]
fn test_unopenable_log_file_disables_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let logger = Logger::builder().header_pattern("").build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    // a directory cannot be opened as the log file
    assert!(logger.set_log_file(temp_dir.path(), false).is_err());
    assert_eq!(logger.log_target(), SinkTarget::Disabled);

    info!(logger, "callback still works");
    logger.poll(true).unwrap();
    assert_eq!(bodies(&captured), vec!["callback still works".to_string()]);
}

#[test]
fn test_rotation_keeps_backups() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("rotating.log");
    let logger = Logger::builder()
        .header_pattern("")
        .log_file(&log_file, true)
        .rotation(RotationPolicy::new(100).with_max_files(2))
        .build()
        .unwrap();

    for i in 0..30 {
        info!(logger, "rotation line {:02}", i);
    }
    logger.poll(true).unwrap();

    let backup = temp_dir.path().join("rotating.log.1");
    assert!(backup.exists());
    assert!(!temp_dir.path().join("rotating.log.3").exists());
    assert!(fs::metadata(&log_file).unwrap().len() <= 100);
    assert_eq!(read_lines(&log_file).last().map(String::as_str), Some("rotation line 29"));
}

#[test]
fn test_reentrant_poll_from_callback() {
    let logger = Arc::new(Logger::builder().stdout(false).build().unwrap());
    let results = Arc::new(Mutex::new(Vec::new()));

    let weak = Arc::downgrade(&logger);
    let out = Arc::clone(&results);
    logger.set_log_callback(
        move |_| {
            if let Some(logger) = weak.upgrade() {
                let result = logger.poll(true);
                out.lock().unwrap().push(matches!(result, Err(LoggerError::ReentrantPoll)));
            }
        },
        LogLevel::Debug,
    );

    info!(logger, "trigger");
    logger.poll(true).unwrap();
    assert_eq!(*results.lock().unwrap(), vec![true]);
}

#[test]
fn test_logging_from_callback_is_deferred() {
    let logger = Arc::new(Logger::builder().stdout(false).build().unwrap());
    let captured = Arc::new(Mutex::new(Vec::new()));

    let weak = Arc::downgrade(&logger);
    let sink = Arc::clone(&captured);
    logger.set_log_callback(
        move |msg| {
            sink.lock().unwrap().push(msg.body().to_string());
            if msg.body() == "outer" {
                if let Some(logger) = weak.upgrade() {
                    info!(logger, "inner");
                }
            }
        },
        LogLevel::Debug,
    );

    info!(logger, "outer");
    logger.poll(true).unwrap();
    assert_eq!(*captured.lock().unwrap(), vec!["outer".to_string(), "inner".to_string()]);
}

macro_rules! report_twice {
    ($logger:expr, $value:expr) => {{
        info!($logger, "first {}", $value);
        warn!($logger, "second statement {} {}", $value, "x");
    }};
}

#[test]
fn test_statements_in_one_user_macro_are_distinct_sites() {
    let logger = Logger::builder().stdout(false).header_pattern("").build().unwrap();
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    logger.set_log_callback(
        move |msg| sink.lock().unwrap().push((msg.level, msg.body().to_string())),
        LogLevel::Debug,
    );

    for _ in 0..2 {
        report_twice!(logger, 7);
    }
    logger.poll(true).unwrap();

    assert_eq!(logger.call_sites().len(), 2);
    let expected = vec![
        (LogLevel::Info, "first 7".to_string()),
        (LogLevel::Warn, "second statement 7 x".to_string()),
    ];
    let got = records.lock().unwrap().clone();
    assert_eq!(got[..2], expected[..]);
    assert_eq!(got[2..], expected[..]);
}

#[test]
fn test_panicking_callback_does_not_stop_drain() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("panic.log");
    let logger = file_logger(&log_file);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    logger.set_log_callback(
        move |msg| {
            counter.fetch_add(1, Ordering::Relaxed);
            if msg.body() == "boom" {
                panic!("callback failure");
            }
        },
        LogLevel::Debug,
    );

    info!(logger, "before");
    info!(logger, "boom");
    info!(logger, "after");
    assert_eq!(logger.poll(true).unwrap(), 3);

    assert_eq!(calls.load(Ordering::Relaxed), 3);
    assert_eq!(read_lines(&log_file), vec!["before", "boom", "after"]);
    assert_eq!(logger.metrics().sink_errors(), 1);
}

#[test]
fn test_malformed_template_renders_diagnostic() {
    let logger = Logger::builder().stdout(false).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    info!(logger, "missing {} and {}", 1);
    info!(logger, "bad spec {:q}", 2);
    logger.poll(true).unwrap();

    let bodies = bodies(&captured);
    assert!(bodies[0].starts_with("[format error:"));
    assert!(bodies[0].ends_with("missing {} and {}"));
    assert!(bodies[1].ends_with("bad spec {:q}"));
}

#[test]
fn test_custom_and_static_arguments() {
    struct Price {
        ticks: i64,
    }

    impl Loggable for Price {
        fn encode(&self, out: &mut Vec<u8>) {
            out.extend_from_slice(&self.ticks.to_le_bytes());
        }

        fn render(bytes: &[u8], out: &mut String) -> std::fmt::Result {
            use std::fmt::Write;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            let ticks = i64::from_le_bytes(raw);
            write!(out, "{}.{:02}", ticks / 100, ticks % 100)
        }
    }

    let logger = Logger::builder().stdout(false).build().unwrap();
    let captured = capture(&logger, LogLevel::Debug);

    let price = Price { ticks: 12345 };
    let venue = StaticStr("XNAS");
    let owned = String::from("buy");
    info!(logger, "{} {} @ {} on {} ({:?})", owned, 100u16, Custom(&price), venue, 'c');
    logger.poll(true).unwrap();

    assert_eq!(bodies(&captured), vec!["buy 100 @ 123.45 on XNAS ('c')".to_string()]);
}

#[test]
fn test_explicit_call_site_registration() {
    let logger = Logger::builder().stdout(false).build().unwrap();
    let meta = || CallSiteMeta::new("src/feed.rs", 42, LogLevel::Warn, "gap of {} packets");

    let id = logger.register_call_site(meta());
    assert_eq!(logger.register_call_site(meta()), id);
    assert_eq!(logger.call_sites().len(), 1);

    let captured = capture(&logger, LogLevel::Debug);
    logger.record(id, LogLevel::Warn, |enc| enc.push(&3u32));
    logger.poll(true).unwrap();

    let captured = captured.lock().unwrap();
    assert_eq!(captured[0].location, "feed.rs:42");
    assert!(captured[0].message.ends_with("gap of 3 packets"));
}

#[test]
fn test_thread_records_survive_thread_exit() {
    let logger = Arc::new(Logger::builder().stdout(false).build().unwrap());
    let captured = capture(&logger, LogLevel::Debug);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let logger = Arc::clone(&logger);
            std::thread::Builder::new()
                .name(format!("short-{}", t))
                .spawn(move || {
                    for i in 0..25 {
                        info!(logger, "{} {}", t, i);
                    }
                })
                .unwrap()
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    logger.poll(true).unwrap();
    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 100);
    assert!(captured.iter().all(|c| c.thread_name.starts_with("short-")));
}

#[test]
fn test_config_file_drives_builder() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("configured.log");
    let config_path = temp_dir.path().join("logger.json");
    let json = serde_json::json!({
        "level": "Warn",
        "header_pattern": "{l} ",
        "log_file": log_file,
        "truncate": true,
    });
    fs::write(&config_path, json.to_string()).unwrap();

    let logger = Logger::builder()
        .config(LoggerConfig::from_file(&config_path).unwrap())
        .build()
        .unwrap();
    info!(logger, "filtered out");
    warn!(logger, "kept");
    logger.poll(true).unwrap();

    assert_eq!(read_lines(&log_file), vec!["WRN kept".to_string()]);
}

#[test]
fn test_background_polling_thread_delivers() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("background.log");
    let logger = Logger::builder()
        .header_pattern("")
        .log_file(&log_file, true)
        .polling_interval(Duration::from_millis(1))
        .build()
        .unwrap();

    for i in 0..100 {
        info!(logger, "bg {}", i);
    }
    assert!(logger.shutdown(Duration::from_secs(5)));
    assert_eq!(read_lines(&log_file).len(), 100);
}

#[test]
fn test_drop_flushes_pending_records() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("drop.log");
    {
        let logger = file_logger(&log_file);
        info!(logger, "pending at drop");
    }
    assert_eq!(read_lines(&log_file), vec!["pending at drop".to_string()]);
}

#[test]
fn test_flush_on_level() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("flush_on.log");
    let logger = Logger::builder()
        .header_pattern("")
        .log_file(&log_file, true)
        .flush_delay(Duration::from_secs(3600))
        .flush_on(LogLevel::Error)
        .build()
        .unwrap();

    info!(logger, "buffered");
    logger.poll(false).unwrap();
    assert_eq!(fs::read_to_string(&log_file).unwrap(), "");

    error!(logger, "urgent");
    logger.poll(false).unwrap();
    assert_eq!(read_lines(&log_file), vec!["buffered".to_string(), "urgent".to_string()]);
}

#[test]
fn test_once_statement_in_loop_across_threads() {
    let logger = Arc::new(Logger::builder().stdout(false).build().unwrap());
    let captured = capture(&logger, LogLevel::Debug);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let logger = Arc::clone(&logger);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    info_once!(logger, "shared once");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.poll(true).unwrap();
    assert_eq!(bodies(&captured), vec!["shared once".to_string()]);
}
