//! Main logger implementation
//!
//! A [`Logger`] is the explicit context every log statement goes through.
//! The producer side stamps, encodes and enqueues a record on the calling
//! thread's own queue; rendering happens later, in [`Logger::poll`] or on
//! the background polling thread.

use super::{
    args::ArgEncoder,
    call_site::{CallSiteId, CallSiteMeta, CallSiteRegistry},
    config::LoggerConfig,
    error::{LoggerError, Result},
    header::{HeaderPattern, DEFAULT_HEADER_PATTERN},
    log_level::LogLevel,
    metrics::LoggerMetrics,
    overflow_policy::{OverflowPolicy, QueueFullCallback},
    poller::{is_draining, DrainMark, Poller},
    sink_config::{LogCallback, LogMessage, MessageFilter, SinkConfig},
    thread_queue::{byte_ring, with_slot, ProducerSlot, PushError, QueueRegistration, ThreadContext},
    timestamp::{Clock, HeaderTimeZone},
};
use crate::sinks::{FileSink, RotationPolicy, SinkTarget, DEFAULT_FLUSH_BUFFER_SIZE, DEFAULT_FLUSH_DELAY};
use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, Receiver, Sender};
use crossbeam_utils::Backoff;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default shutdown timeout for logger cleanup (5 seconds)
///
/// This timeout is used when the logger is dropped without explicit shutdown.
/// For custom timeout control, use the `shutdown()` method instead.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-thread queue size in bytes
pub const DEFAULT_QUEUE_CAPACITY: usize = 1 << 20;

/// Smallest accepted per-thread queue size in bytes
pub const MIN_QUEUE_CAPACITY: usize = 64;

const BLOCK_SLEEP: Duration = Duration::from_micros(50);

static NEXT_LOGGER_ID: AtomicU32 = AtomicU32::new(1);

struct PollingThread {
    handle: JoinHandle<()>,
    /// dropping the sender stops the thread
    wake: Sender<()>,
}

pub(crate) struct LoggerInner {
    pub(crate) id: u32,
    level: AtomicU8,
    clock: Clock,
    pub(crate) registry: CallSiteRegistry,
    config: RwLock<Arc<SinkConfig>>,
    pub(crate) file_sink: Mutex<FileSink>,
    pub(crate) metrics: LoggerMetrics,
    overflow_policy: OverflowPolicy,
    queue_capacity: usize,
    registrations: Sender<QueueRegistration>,
    /// also the drain guard: whoever holds it is the one consumer
    poller: Mutex<Poller>,
    polling: Mutex<Option<PollingThread>>,
}

impl LoggerInner {
    #[inline]
    pub(crate) fn is_enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level.as_u8() >= self.level.load(Ordering::Relaxed)
    }

    pub(crate) fn sink_config(&self) -> Arc<SinkConfig> {
        self.config.read().clone()
    }

    fn update_config(&self, update: impl FnOnce(&mut SinkConfig)) {
        let mut current = self.config.write();
        let mut next = SinkConfig::clone(&current);
        update(&mut next);
        *current = Arc::new(next);
    }

    fn poll(&self, force: bool) -> Result<usize> {
        let Some(_mark) = DrainMark::enter(self.id) else {
            return Err(LoggerError::ReentrantPoll);
        };
        let mut poller = if force {
            self.poller.lock()
        } else {
            match self.poller.try_lock() {
                Some(poller) => poller,
                None => return Ok(0),
            }
        };
        Ok(poller.drain(self, force))
    }

    fn create_slot(&self) -> Option<ProducerSlot> {
        let (producer, consumer) = byte_ring(self.queue_capacity);
        let ctx = Arc::new(ThreadContext::for_current_thread());
        self.registrations
            .send(QueueRegistration {
                ctx: Arc::clone(&ctx),
                consumer,
            })
            .ok()?;
        Some(ProducerSlot {
            logger_id: self.id,
            producer,
            scratch: Vec::with_capacity(256),
            overflowing: false,
            sites: Vec::new(),
            ctx,
        })
    }

    fn with_own_slot<R>(&self, f: impl FnOnce(&mut ProducerSlot) -> R) -> Option<R> {
        with_slot(self.id, || self.create_slot(), f)
    }

    fn record(&self, site: CallSiteId, level: LogLevel, encode: impl FnOnce(&mut ArgEncoder<'_>)) {
        if !self.is_enabled(level) {
            return;
        }
        let timestamp_ns = self.clock.now_ns();
        let queued = self.with_own_slot(|slot| {
            if !self.may_pass(slot, site, timestamp_ns) {
                return;
            }
            let mut enc = ArgEncoder::begin(&mut slot.scratch, timestamp_ns, site, level);
            encode(&mut enc);
            if !enc.finish() {
                self.metrics.record_dropped();
                eprintln!(
                    "[LOGGER WARNING] Dropping record with more than {} arguments",
                    super::args::MAX_ARGS
                );
                return;
            }
            self.push_record(slot);
        });
        // slot table busy (logging from inside a log call) or thread exiting
        if queued.is_none() {
            self.metrics.record_dropped();
        }
    }

    /// Producer-side rate-limit pre-filter
    fn may_pass(&self, slot: &mut ProducerSlot, site: CallSiteId, timestamp_ns: u64) -> bool {
        if site.index() >= slot.sites.len() {
            self.registry.extend_cache(&mut slot.sites);
        }
        slot.sites
            .get(site.index())
            .map_or(true, |site| site.may_pass(timestamp_ns))
    }

    fn push_record(&self, slot: &mut ProducerSlot) {
        let mut backoff: Option<Backoff> = None;
        loop {
            match slot.producer.push(&slot.scratch) {
                Ok(()) => {
                    slot.overflowing = false;
                    return;
                }
                Err(PushError::TooLarge) => {
                    self.metrics.record_dropped();
                    return;
                }
                Err(PushError::Full) => {}
            }

            if !slot.overflowing {
                // new overflow episode: notify once, then retry since the
                // callback may have drained the queue
                slot.overflowing = true;
                self.metrics.record_queue_full();
                if let Some(callback) = self.sink_config().queue_full.as_ref() {
                    callback();
                }
                continue;
            }

            match self.overflow_policy {
                OverflowPolicy::Drop => {
                    self.metrics.record_dropped();
                    return;
                }
                OverflowPolicy::Block => {
                    // nobody else can free this queue while we hold the drain
                    if is_draining(self.id) {
                        self.metrics.record_dropped();
                        return;
                    }
                    let backoff = backoff.get_or_insert_with(|| {
                        self.metrics.record_block();
                        Backoff::new()
                    });
                    self.wake_poller();
                    if backoff.is_completed() {
                        thread::sleep(BLOCK_SLEEP);
                    } else {
                        backoff.snooze();
                    }
                }
            }
        }
    }

    /// Nudge the polling thread, or drain on this thread without one
    fn wake_poller(&self) {
        if let Some(polling) = self.polling.lock().as_ref() {
            let _ = polling.wake.try_send(());
            return;
        }
        let _ = self.poll(false);
    }

    fn stop_polling_thread(&self, timeout: Duration) -> bool {
        let Some(PollingThread { handle, wake }) = self.polling.lock().take() else {
            return true;
        };
        drop(wake);

        if handle.thread().id() == thread::current().id() {
            // stopped from one of its own callbacks; it exits after this drain
            return true;
        }

        let start = Instant::now();
        loop {
            if handle.is_finished() {
                // Thread finished, join it to check for panics
                if let Err(e) = handle.join() {
                    eprintln!("[LOGGER ERROR] Polling thread panicked: {:?}", e);
                    return false;
                }
                return true;
            }
            if start.elapsed() >= timeout {
                eprintln!(
                    "[LOGGER WARNING] Polling thread did not finish within {:?} timeout. \
                     Some logs may be lost.",
                    timeout
                );
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Forced drain that gives up if the drain guard stays busy past `timeout`
    fn final_drain(&self, timeout: Duration) -> bool {
        let Some(_mark) = DrainMark::enter(self.id) else {
            eprintln!("[LOGGER WARNING] Shutdown requested from inside a drain; skipping final drain");
            return false;
        };
        match self.poller.try_lock_for(timeout) {
            Some(mut poller) => {
                poller.drain(self, true);
                true
            }
            None => {
                eprintln!(
                    "[LOGGER WARNING] Final drain could not start within {:?} timeout. \
                     Some logs may be lost.",
                    timeout
                );
                false
            }
        }
    }
}

fn run_polling_thread(inner: &LoggerInner, wake: &Receiver<()>, interval: Duration) {
    loop {
        match wake.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if let Err(e) = inner.poll(false) {
            eprintln!("[LOGGER ERROR] Polling thread drain failed: {}", e);
        }
    }
    if let Err(e) = inner.poll(true) {
        eprintln!("[LOGGER ERROR] Polling thread final drain failed: {}", e);
    }
}

/// Asynchronous logger
///
/// # Example
///
/// ```
/// use deferred_logger::{info, Logger, LogLevel};
///
/// let logger = Logger::builder()
///     .level(LogLevel::Debug)
///     .stdout(false)
///     .build()
///     .unwrap();
///
/// info!(logger, "order {} filled at {:.2}", 42, 101.5);
/// assert_eq!(logger.poll(true).unwrap(), 1);
/// ```
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    /// Logger with default settings: level `Info`, output to stdout, no
    /// polling thread
    #[must_use]
    pub fn new() -> Self {
        LoggerBuilder::new().assemble()
    }

    /// Create a builder for Logger
    ///
    /// # Example
    /// ```
    /// use deferred_logger::prelude::*;
    /// use std::time::Duration;
    ///
    /// let logger = Logger::builder()
    ///     .level(LogLevel::Debug)
    ///     .queue_capacity(64 * 1024)
    ///     .overflow_policy(OverflowPolicy::Block)
    ///     .polling_interval(Duration::from_millis(1))
    ///     .stdout(false)
    ///     .build()
    ///     .unwrap();
    /// ```
    #[must_use]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.level.load(Ordering::Relaxed))
    }

    /// Change the threshold; queued records are judged by the threshold in
    /// force when they are drained
    pub fn set_level(&self, level: LogLevel) {
        self.inner.level.store(level.as_u8(), Ordering::Relaxed);
    }

    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.inner.is_enabled(level)
    }

    /// Register a call site, or look up the id of an already registered one
    pub fn register_call_site(&self, meta: CallSiteMeta) -> CallSiteId {
        self.inner.registry.register(meta)
    }

    pub fn call_sites(&self) -> &CallSiteRegistry {
        &self.inner.registry
    }

    /// Enqueue one record; used by the logging macros
    #[doc(hidden)]
    #[inline]
    pub fn record(&self, site: CallSiteId, level: LogLevel, encode: impl FnOnce(&mut ArgEncoder<'_>)) {
        self.inner.record(site, level, encode);
    }

    /// Drain queued records and dispatch them to the sinks
    ///
    /// A non-forced poll does one pass and returns `Ok(0)` right away when
    /// another thread is draining. A forced poll waits for that drain, then
    /// keeps going until every queue is empty and flushes the file sink.
    ///
    /// Returns the number of records taken off the queues, including ones
    /// suppressed at drain time.
    ///
    /// # Errors
    ///
    /// [`LoggerError::ReentrantPoll`] when called from a callback of a drain
    /// running on this thread.
    pub fn poll(&self, force: bool) -> Result<usize> {
        self.inner.poll(force)
    }

    /// Create the calling thread's queue now instead of on its first log call
    ///
    /// Returns `false` if the queue could not be set up.
    pub fn preallocate(&self) -> bool {
        self.inner.with_own_slot(|_| ()).is_some()
    }

    /// Name shown for the calling thread in headers and callbacks
    pub fn set_thread_name(&self, name: impl Into<String>) {
        let name = name.into();
        if self.inner.with_own_slot(|slot| slot.ctx.set_name(name)).is_none() {
            eprintln!("[LOGGER WARNING] Could not set thread name: thread queue unavailable");
        }
    }

    pub fn set_header_pattern(&self, pattern: &str) {
        let header = Arc::new(HeaderPattern::compile(pattern));
        self.inner.update_config(|config| config.header = header);
    }

    pub fn set_header_time_zone(&self, tz: HeaderTimeZone) {
        self.inner.update_config(|config| config.header_time_zone = tz);
    }

    /// Only records at or above `level` are written to the file or stdout
    pub fn set_file_level(&self, level: LogLevel) {
        self.inner.update_config(|config| config.file_level = level);
    }

    pub fn set_log_callback<F>(&self, callback: F, min_level: LogLevel)
    where
        F: Fn(&LogMessage<'_>) + Send + Sync + 'static,
    {
        let callback: LogCallback = Arc::new(callback);
        self.inner
            .update_config(|config| config.log_callback = Some((callback, min_level)));
    }

    pub fn clear_log_callback(&self) {
        self.inner.update_config(|config| config.log_callback = None);
    }

    /// Install a filter that may replace each rendered line before output
    pub fn set_message_filter<F>(&self, filter: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let filter: MessageFilter = Arc::new(filter);
        self.inner
            .update_config(|config| config.message_filter = Some(filter));
    }

    pub fn clear_message_filter(&self) {
        self.inner.update_config(|config| config.message_filter = None);
    }

    /// Called on the producing thread once per overflow episode
    pub fn set_queue_full_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: QueueFullCallback = Arc::new(callback);
        self.inner
            .update_config(|config| config.queue_full = Some(callback));
    }

    pub fn clear_queue_full_callback(&self) {
        self.inner.update_config(|config| config.queue_full = None);
    }

    /// Write to `path` from the next rendered record on
    ///
    /// # Errors
    ///
    /// Returns the open failure; output stays disabled until the next
    /// successful `set_log_file` or `set_stdout_fallback(true)`.
    pub fn set_log_file(&self, path: impl AsRef<Path>, truncate: bool) -> Result<()> {
        self.inner.file_sink.lock().open(path, truncate)
    }

    /// Close the log file; nothing is written to stdout afterwards either
    pub fn close_log_file(&self) -> Result<()> {
        self.inner.file_sink.lock().close()
    }

    pub fn set_stdout_fallback(&self, enabled: bool) {
        self.inner.file_sink.lock().set_stdout_fallback(enabled);
    }

    pub fn log_target(&self) -> SinkTarget {
        self.inner.file_sink.lock().target()
    }

    pub fn set_flush_delay(&self, delay: Duration) {
        self.inner.file_sink.lock().set_flush_delay(delay);
    }

    pub fn set_flush_buffer_size(&self, size: usize) {
        self.inner.file_sink.lock().set_flush_buffer_size(size);
    }

    /// Flush right after writing any record at or above `level`
    pub fn set_flush_on(&self, level: LogLevel) {
        self.inner.file_sink.lock().set_flush_on(level);
    }

    pub fn set_rotation(&self, rotation: Option<RotationPolicy>) {
        self.inner.file_sink.lock().set_rotation(rotation);
    }

    /// Flush buffered output without draining the queues
    pub fn flush(&self) -> Result<()> {
        self.inner.file_sink.lock().flush()
    }

    /// Start a background thread that polls every `interval`, and whenever
    /// a blocked producer asks for room
    ///
    /// # Errors
    ///
    /// [`LoggerError::PollingThreadRunning`] if one is already running,
    /// [`LoggerError::PollingThreadSpawn`] if the OS refuses the thread.
    pub fn start_polling_thread(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(LoggerError::config(
                "polling_interval",
                "Polling interval must be greater than zero",
            ));
        }
        let mut polling = self.inner.polling.lock();
        if let Some(running) = polling.as_ref() {
            if !running.handle.is_finished() {
                return Err(LoggerError::PollingThreadRunning);
            }
            if let Some(dead) = polling.take() {
                if dead.handle.join().is_err() {
                    eprintln!("[LOGGER ERROR] Previous polling thread had panicked");
                }
            }
        }

        let (wake, wakeups) = bounded(8);
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("log-poller".to_string())
            .spawn(move || run_polling_thread(&inner, &wakeups, interval))
            .map_err(|e| LoggerError::PollingThreadSpawn(e.to_string()))?;
        *polling = Some(PollingThread { handle, wake });
        Ok(())
    }

    /// Stop the polling thread after its final forced drain
    ///
    /// Returns `false` if it panicked or did not finish within
    /// [`DEFAULT_SHUTDOWN_TIMEOUT`].
    pub fn stop_polling_thread(&self) -> bool {
        self.inner.stop_polling_thread(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    pub fn is_polling_thread_running(&self) -> bool {
        self.inner
            .polling
            .lock()
            .as_ref()
            .is_some_and(|polling| !polling.handle.is_finished())
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.inner.overflow_policy
    }

    /// Per-thread queue size in bytes
    pub fn queue_capacity(&self) -> usize {
        self.inner.queue_capacity
    }

    /// Get the logger metrics for detailed observability
    ///
    /// # Example
    ///
    /// ```
    /// use deferred_logger::Logger;
    ///
    /// let logger = Logger::builder().stdout(false).build().unwrap();
    ///
    /// let snap = logger.metrics().snapshot();
    /// println!("lost {} of {} records ({:.2}%)", snap.dropped, snap.captured(), snap.drop_rate());
    /// ```
    pub fn metrics(&self) -> &LoggerMetrics {
        &self.inner.metrics
    }

    /// Gracefully shutdown the logger with a custom timeout
    ///
    /// Stops the polling thread, then drains every queue and flushes the
    /// file. The logger stays usable afterwards; later records are picked
    /// up by explicit polls.
    ///
    /// **Note**: When the logger is dropped without calling `shutdown()` explicitly,
    /// it uses [`DEFAULT_SHUTDOWN_TIMEOUT`] (5 seconds).
    ///
    /// # Returns
    ///
    /// `true` if shutdown completed successfully within timeout, `false` otherwise
    ///
    /// # Example
    ///
    /// ```no_run
    /// use deferred_logger::{info, Logger};
    /// use std::time::Duration;
    ///
    /// let logger = Logger::builder()
    ///     .polling_interval(Duration::from_millis(5))
    ///     .build()
    ///     .unwrap();
    /// info!(logger, "Important message");
    ///
    /// if !logger.shutdown(Duration::from_secs(10)) {
    ///     eprintln!("Warning: Logger shutdown timed out");
    /// }
    /// ```
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let stopped = self.inner.stop_polling_thread(timeout);
        let drained = self
            .inner
            .final_drain(timeout.saturating_sub(start.elapsed()));
        stopped && drained
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);

        // Report any dropped logs
        let dropped = self.inner.metrics.dropped_count();
        if dropped > 0 {
            eprintln!(
                "[LOGGER WARNING] Logger shutting down with {} dropped logs (drop rate: {:.2}%)",
                dropped,
                self.inner.metrics.drop_rate()
            );
        }
    }
}

/// Builder for constructing Logger with a fluent API
///
/// # Example
/// ```
/// use deferred_logger::prelude::*;
///
/// let logger = Logger::builder()
///     .level(LogLevel::Debug)
///     .header_pattern("{YmdHMSe} {l} ")
///     .overflow_policy(OverflowPolicy::Drop)
///     .on_queue_full(|| eprintln!("ALERT: log queue full"))
///     .stdout(false)
///     .build()
///     .unwrap();
/// ```
pub struct LoggerBuilder {
    queue_capacity: usize,
    overflow_policy: OverflowPolicy,
    level: LogLevel,
    header_pattern: String,
    header_time_zone: HeaderTimeZone,
    log_file: Option<(PathBuf, bool)>,
    stdout: bool,
    file_level: LogLevel,
    flush_delay: Duration,
    flush_buffer_size: usize,
    flush_on: LogLevel,
    rotation: Option<RotationPolicy>,
    log_callback: Option<(LogCallback, LogLevel)>,
    message_filter: Option<MessageFilter>,
    queue_full: Option<QueueFullCallback>,
    polling_interval: Option<Duration>,
}

impl LoggerBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::Drop,
            level: LogLevel::Info,
            header_pattern: DEFAULT_HEADER_PATTERN.to_string(),
            header_time_zone: HeaderTimeZone::Utc,
            log_file: None,
            stdout: true,
            file_level: LogLevel::Debug,
            flush_delay: DEFAULT_FLUSH_DELAY,
            flush_buffer_size: DEFAULT_FLUSH_BUFFER_SIZE,
            flush_on: LogLevel::Off,
            rotation: None,
            log_callback: None,
            message_filter: None,
            queue_full: None,
            polling_interval: None,
        }
    }

    /// Size in bytes of each thread's queue
    #[must_use = "builder methods return a new value"]
    pub fn queue_capacity(mut self, bytes: usize) -> Self {
        self.queue_capacity = bytes;
        self
    }

    /// Set the policy for a full thread queue
    ///
    /// Default is `Drop`.
    #[must_use = "builder methods return a new value"]
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set minimum log level
    #[must_use = "builder methods return a new value"]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn header_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.header_pattern = pattern.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn header_time_zone(mut self, tz: HeaderTimeZone) -> Self {
        self.header_time_zone = tz;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn log_file(mut self, path: impl Into<PathBuf>, truncate: bool) -> Self {
        self.log_file = Some((path.into(), truncate));
        self
    }

    /// Write to stdout while no log file is open (default on)
    #[must_use = "builder methods return a new value"]
    pub fn stdout(mut self, enabled: bool) -> Self {
        self.stdout = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn file_level(mut self, level: LogLevel) -> Self {
        self.file_level = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn flush_buffer_size(mut self, bytes: usize) -> Self {
        self.flush_buffer_size = bytes;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn flush_on(mut self, level: LogLevel) -> Self {
        self.flush_on = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn rotation(mut self, policy: RotationPolicy) -> Self {
        self.rotation = Some(policy);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn log_callback<F>(mut self, callback: F, min_level: LogLevel) -> Self
    where
        F: Fn(&LogMessage<'_>) + Send + Sync + 'static,
    {
        self.log_callback = Some((Arc::new(callback), min_level));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn message_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.message_filter = Some(Arc::new(filter));
        self
    }

    /// Set a callback for queue-full notifications
    ///
    /// The callback runs on the producing thread, once per overflow episode.
    #[must_use = "builder methods return a new value"]
    pub fn on_queue_full<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.queue_full = Some(Arc::new(callback));
        self
    }

    /// Start a background polling thread with this interval at build time
    #[must_use = "builder methods return a new value"]
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }

    /// Apply every setting carried by a [`LoggerConfig`]
    ///
    /// Callbacks already set on the builder are kept.
    #[must_use = "builder methods return a new value"]
    pub fn config(mut self, config: LoggerConfig) -> Self {
        self.queue_capacity = config.queue_capacity;
        self.overflow_policy = config.overflow_policy;
        self.level = config.level;
        self.header_pattern = config.header_pattern;
        self.header_time_zone = config.header_time_zone;
        self.log_file = config.log_file.map(|path| (path, config.truncate));
        self.stdout = config.stdout;
        self.file_level = config.file_level;
        self.flush_delay = Duration::from_millis(config.flush_delay_ms);
        self.flush_buffer_size = config.flush_buffer_size;
        self.flush_on = config.flush_on;
        self.rotation = config.rotation;
        self.polling_interval = config.polling_interval_ms.map(Duration::from_millis);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(LoggerError::config(
                "queue_capacity",
                format!(
                    "Queue capacity must be at least {} bytes, got {}",
                    MIN_QUEUE_CAPACITY, self.queue_capacity
                ),
            ));
        }
        if let Some((path, _)) = &self.log_file {
            if path.as_os_str().is_empty() {
                return Err(LoggerError::config("log_file", "Log file path is empty"));
            }
        }
        if self.polling_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(LoggerError::config(
                "polling_interval",
                "Polling interval must be greater than zero",
            ));
        }
        Ok(())
    }

    fn assemble(&mut self) -> Logger {
        let id = NEXT_LOGGER_ID.fetch_add(1, Ordering::Relaxed);
        let (registrations, registered) = unbounded();

        let mut file_sink = FileSink::new();
        file_sink.set_stdout_fallback(self.stdout);
        file_sink.set_flush_delay(self.flush_delay);
        file_sink.set_flush_buffer_size(self.flush_buffer_size);
        file_sink.set_flush_on(self.flush_on);
        file_sink.set_rotation(self.rotation.take());

        let config = SinkConfig {
            header: Arc::new(HeaderPattern::compile(&self.header_pattern)),
            header_time_zone: self.header_time_zone,
            file_level: self.file_level,
            log_callback: self.log_callback.take(),
            message_filter: self.message_filter.take(),
            queue_full: self.queue_full.take(),
        };

        Logger {
            inner: Arc::new(LoggerInner {
                id,
                level: AtomicU8::new(self.level.as_u8()),
                clock: Clock::new(),
                registry: CallSiteRegistry::new(id),
                config: RwLock::new(Arc::new(config)),
                file_sink: Mutex::new(file_sink),
                metrics: LoggerMetrics::new(),
                overflow_policy: self.overflow_policy,
                queue_capacity: self.queue_capacity,
                registrations,
                poller: Mutex::new(Poller::new(registered)),
                polling: Mutex::new(None),
            }),
        }
    }

    /// Build the Logger
    ///
    /// # Errors
    ///
    /// [`LoggerError::InvalidConfiguration`] for a queue capacity below
    /// [`MIN_QUEUE_CAPACITY`], an empty log file path or a zero polling
    /// interval; the open error if the log file cannot be opened; a polling
    /// thread spawn failure.
    pub fn build(mut self) -> Result<Logger> {
        self.validate()?;
        let logger = self.assemble();
        if let Some((path, truncate)) = self.log_file.take() {
            logger.set_log_file(path, truncate)?;
        }
        if let Some(interval) = self.polling_interval {
            logger.start_polling_thread(interval)?;
        }
        Ok(logger)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
