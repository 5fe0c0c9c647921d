//! Drain stage
//!
//! The poller owns the consumer half of every thread queue. A drain merges
//! the queues by capture timestamp (one head per queue in a min-heap, so
//! per-thread order is kept), then for each record: re-checks the level,
//! applies the call site's rate limit, renders header and body, runs the
//! message filter and dispatches to the file sink and the log callback.
//!
//! Only one drain runs at a time per logger; the logger holds the poller
//! behind a mutex that doubles as the drain guard.

use super::args::{decode_args, ArgValue, RecordHeader};
use super::call_site::{CallSite, CallSiteId, CallSiteRegistry};
use super::header::HeaderContext;
use super::logger::LoggerInner;
use super::sink_config::{apply_filter, LogMessage};
use super::thread_queue::{QueueRegistration, RingConsumer, ThreadContext};
use crate::core::error::LoggerError;
use crate::sinks::FileSink;
use crossbeam_channel::Receiver;
use std::any::Any;
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

thread_local! {
    /// Loggers the current thread is draining right now
    static DRAINING: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
}

/// Whether the calling thread is inside a drain of logger `logger_id`
pub(crate) fn is_draining(logger_id: u32) -> bool {
    DRAINING
        .try_with(|ids| ids.borrow().contains(&logger_id))
        .unwrap_or(false)
}

/// Marks the calling thread as draining `logger_id` until dropped
pub(crate) struct DrainMark {
    logger_id: u32,
}

impl DrainMark {
    /// `None` if this thread is already draining the logger
    pub(crate) fn enter(logger_id: u32) -> Option<Self> {
        DRAINING
            .try_with(|ids| {
                let mut ids = ids.borrow_mut();
                if ids.contains(&logger_id) {
                    return None;
                }
                ids.push(logger_id);
                Some(Self { logger_id })
            })
            .ok()
            .flatten()
    }
}

impl Drop for DrainMark {
    fn drop(&mut self) {
        let _ = DRAINING.try_with(|ids| {
            let mut ids = ids.borrow_mut();
            if let Some(pos) = ids.iter().rposition(|id| *id == self.logger_id) {
                ids.swap_remove(pos);
            }
        });
    }
}

struct QueueState {
    ctx: Arc<ThreadContext>,
    consumer: RingConsumer,
}

pub(crate) struct Poller {
    registrations: Receiver<QueueRegistration>,
    queues: Vec<QueueState>,
    heap: BinaryHeap<Reverse<(u64, usize)>>,
    /// local copy of the registry, indexed by call-site id
    sites: Vec<Arc<CallSite>>,
    args: Vec<ArgValue<'static>>,
    line: String,
    thread_name: String,
}

impl Poller {
    pub(crate) fn new(registrations: Receiver<QueueRegistration>) -> Self {
        Self {
            registrations,
            queues: Vec::new(),
            heap: BinaryHeap::new(),
            sites: Vec::new(),
            args: Vec::with_capacity(16),
            line: String::with_capacity(256),
            thread_name: String::new(),
        }
    }

    pub(crate) fn queue_count(&self) -> usize {
        self.queues.len()
    }

    fn accept_registrations(&mut self) {
        while let Ok(reg) = self.registrations.try_recv() {
            self.queues.push(QueueState {
                ctx: reg.ctx,
                consumer: reg.consumer,
            });
        }
    }

    /// Drain records and dispatch them; returns how many were taken off the
    /// queues, whether or not they were rendered
    ///
    /// A forced drain keeps going until every queue, including ones
    /// registered meanwhile, is empty, then flushes the file sink.
    pub(crate) fn drain(&mut self, inner: &LoggerInner, force: bool) -> usize {
        self.accept_registrations();
        let mut drained = 0;
        let mut args = reuse_args(std::mem::take(&mut self.args));

        let Self {
            registrations,
            queues,
            heap,
            sites,
            line,
            thread_name,
            ..
        } = &mut *self;

        loop {
            heap.clear();
            for (idx, queue) in queues.iter_mut().enumerate() {
                if let Some(record) = queue.consumer.peek() {
                    heap.push(Reverse((RecordHeader::peek_timestamp(record).unwrap_or(0), idx)));
                }
            }
            if heap.is_empty() {
                break;
            }

            while let Some(Reverse((_, idx))) = heap.pop() {
                let queue = &mut queues[idx];
                let Some(record) = queue.consumer.peek() else {
                    continue;
                };
                let mut decoded = reuse_args(args);
                match decode_args(record, &mut decoded) {
                    Ok(header) => {
                        thread_name.clear();
                        thread_name.push_str(queue.ctx.name().as_str());
                        emit(inner, sites, line, thread_name, header, &decoded);
                    }
                    Err(e) => {
                        inner.metrics.record_dropped();
                        eprintln!("[LOGGER ERROR] Discarding undecodable record: {}", e);
                    }
                }
                args = reuse_args(decoded);
                queue.consumer.pop();
                drained += 1;

                if let Some(next) = queue.consumer.peek() {
                    heap.push(Reverse((RecordHeader::peek_timestamp(next).unwrap_or(0), idx)));
                }
            }

            if !force {
                break;
            }
            while let Ok(reg) = registrations.try_recv() {
                queues.push(QueueState {
                    ctx: reg.ctx,
                    consumer: reg.consumer,
                });
            }
        }
        self.args = reuse_args(args);

        // closed is checked first: once set, the producer pushes nothing more
        self.queues
            .retain_mut(|q| !(q.ctx.is_closed() && q.consumer.is_empty()));

        let mut sink = inner.file_sink.lock();
        if let Err(e) = sink.tick(force) {
            report_sink_error(inner, &mut sink, e);
        }
        drained
    }
}

/// Hand an argument buffer's allocation to records of another lifetime
fn reuse_args<'b>(mut args: Vec<ArgValue<'_>>) -> Vec<ArgValue<'b>> {
    args.clear();
    args.into_iter().map(|_| ArgValue::Bool(false)).collect()
}

fn site_for<'s>(
    registry: &CallSiteRegistry,
    sites: &'s mut Vec<Arc<CallSite>>,
    id: CallSiteId,
) -> Option<&'s CallSite> {
    if id.index() >= sites.len() {
        registry.extend_cache(sites);
    }
    sites.get(id.index()).map(|site| &**site)
}

fn report_sink_error(inner: &LoggerInner, sink: &mut FileSink, err: LoggerError) {
    inner.metrics.record_sink_error();
    eprintln!("[LOGGER ERROR] Log output disabled after failure: {}", err);
    sink.disable();
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "Unknown panic"
    }
}

fn emit(
    inner: &LoggerInner,
    sites: &mut Vec<Arc<CallSite>>,
    line: &mut String,
    thread_name: &str,
    header: RecordHeader,
    args: &[ArgValue<'_>],
) {
    let metrics = &inner.metrics;
    // binding level check: the level in force now, not at capture time
    if !inner.is_enabled(header.level) {
        metrics.record_suppressed();
        return;
    }
    let Some(site) = site_for(&inner.registry, sites, header.site) else {
        metrics.record_dropped();
        eprintln!(
            "[LOGGER ERROR] Record references unknown call site {}",
            header.site.as_u32()
        );
        return;
    };
    if !site.admit(header.timestamp_ns) {
        metrics.record_suppressed();
        return;
    }

    let config = inner.sink_config();
    line.clear();
    config.header.render(
        &HeaderContext {
            timestamp_ns: header.timestamp_ns,
            level: header.level,
            short_location: site.short_location(),
            full_location: site.full_location(),
            thread_name,
        },
        config.header_time_zone,
        line,
    );
    let body_pos = line.len();
    site.template().render_or_diagnostic(args, line);

    let filtered = match &config.message_filter {
        Some(filter) => {
            let run = || apply_filter(&**filter, line.as_str(), body_pos);
            match panic::catch_unwind(AssertUnwindSafe(run)) {
                Ok(replacement) => replacement,
                Err(payload) => {
                    metrics.record_sink_error();
                    eprintln!(
                        "[LOGGER CRITICAL] Message filter panicked: {}. Passing the line through.",
                        panic_message(&*payload)
                    );
                    None
                }
            }
        }
        None => None,
    };
    let (message, body_pos) = match &filtered {
        Some((replacement, pos)) => (replacement.as_str(), *pos),
        None => (line.as_str(), body_pos),
    };

    let file_pos = {
        let mut sink = inner.file_sink.lock();
        let written = if header.level >= config.file_level {
            sink.write_line(message, header.level)
        } else {
            Ok(sink.position())
        };
        match written {
            Ok(pos) => pos,
            Err(e) => {
                report_sink_error(inner, &mut sink, e);
                None
            }
        }
    };

    if let Some((callback, min_level)) = &config.log_callback {
        if header.level >= *min_level {
            let msg = LogMessage {
                timestamp_ns: header.timestamp_ns,
                level: header.level,
                location: site.short_location(),
                base_pos: 0,
                thread_name,
                message,
                body_pos,
                file_pos,
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(&msg))) {
                metrics.record_sink_error();
                eprintln!(
                    "[LOGGER CRITICAL] Log callback panicked: {}",
                    panic_message(&*payload)
                );
            }
        }
    }
    metrics.record_logged();
}
