//! Leveled, multi-sink logging with transport-bounded exception reports.
//!
//! Every subsystem constructs a [`Logging`] façade with a static tag
//! ("planner", "reactive", "power") over a shared [`LogRouter`]. Sinks are
//! registered once on the router and receive every message from every
//! façade; a sink may be a serial console, a wireless notification channel,
//! or the [`TracingSink`] bridge into the host `tracing` subscriber.
//!
//! # Message protocol
//!
//! - A message line reaching a sink is already rendered: `"tag: text"`.
//! - Exception reports walk the error source chain. A report longer than
//!   [`MESSAGE_LIMIT`] bytes is split into chunks; every non-final chunk is
//!   terminated with a `'\f'` continuation marker, and only the first chunk
//!   carries the tag prefix. Readers reassemble on the marker.
//!
//! # Invariants
//!
//! 1. Sinks receive messages in registration order.
//! 2. A façade drops messages below its minimum level before they reach
//!    any sink.
//! 3. One failing task produces exactly one exception report (one or more
//!    chunks) per failed invocation.

use std::cell::{Cell, RefCell};
use std::error::Error;
use std::fmt;
use std::rc::Rc;

/// Size budget for a single sink message, matching the smallest transport
/// frame the firmware ships logs over.
pub const MESSAGE_LIMIT: usize = 512;

/// Marker terminating every non-final chunk of a split report.
pub const CONTINUATION_MARK: char = '\u{c}';

// ─── Levels ──────────────────────────────────────────────────────────────────

/// Message severity. `Value` sits between `Info` and `Warning` and carries
/// measurement snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Value,
    Warning,
    Error,
    Critical,
}

impl Level {
    /// Numeric id used by sink-side filtering and wire encodings.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Level::Debug => 11,
            Level::Info => 21,
            Level::Value => 22,
            Level::Warning => 31,
            Level::Error => 41,
            Level::Critical => 51,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Value => "value",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
        };
        f.write_str(name)
    }
}

// ─── Sinks ───────────────────────────────────────────────────────────────────

/// Destination for rendered log lines.
pub trait LogSink {
    /// Receive one rendered line. `line` already carries the tag prefix
    /// where the protocol calls for one.
    fn log(&self, level: Level, line: &str);
}

/// Bridge into the `tracing` ecosystem for host builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, line: &str) {
        match level {
            Level::Debug => tracing::debug!("{}", line),
            Level::Info => tracing::info!("{}", line),
            Level::Value => tracing::info!(kind = "value", "{}", line),
            Level::Warning => tracing::warn!("{}", line),
            Level::Error | Level::Critical => tracing::error!("{}", line),
        }
    }
}

/// Capturing sink for tests.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Rc<RefCell<Vec<(Level, String)>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything logged so far, in arrival order.
    #[must_use]
    pub fn records(&self) -> Vec<(Level, String)> {
        self.records.borrow().clone()
    }

    /// Number of lines recorded at exactly `level`.
    #[must_use]
    pub fn count_at(&self, level: Level) -> usize {
        self.records.borrow().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, line: &str) {
        self.records.borrow_mut().push((level, line.to_string()));
    }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Shared ordered sink list. Cloning yields another handle to the same list.
#[derive(Clone, Default)]
pub struct LogRouter {
    sinks: Rc<RefCell<Vec<Box<dyn LogSink>>>>,
}

impl LogRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&self, sink: impl LogSink + 'static) {
        self.sinks.borrow_mut().push(Box::new(sink));
    }

    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.borrow().len()
    }

    fn dispatch(&self, level: Level, line: &str) {
        for sink in self.sinks.borrow().iter() {
            sink.log(level, line);
        }
    }
}

// ─── Façade ──────────────────────────────────────────────────────────────────

/// Per-subsystem logging front end with a fixed tag and a minimum level.
pub struct Logging {
    tag: String,
    min_level: Cell<Level>,
    router: LogRouter,
}

impl Logging {
    /// A façade tagged `tag`, filtering below [`Level::Info`] by default.
    #[must_use]
    pub fn new(tag: impl Into<String>, router: &LogRouter) -> Self {
        Self {
            tag: tag.into(),
            min_level: Cell::new(Level::Info),
            router: router.clone(),
        }
    }

    pub fn set_min_level(&self, level: Level) {
        self.min_level.set(level);
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Log `message` at `level`, prefixed with the façade tag. Dropped when
    /// below the minimum level.
    pub fn log(&self, level: Level, message: &str) {
        if level < self.min_level.get() {
            return;
        }
        self.emit(level, message, true);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn value(&self, message: &str) {
        self.log(Level::Value, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    pub fn critical(&self, message: &str) {
        self.log(Level::Critical, message);
    }

    /// Report `error` and its source chain at [`Level::Error`], split into
    /// transport-sized chunks.
    ///
    /// `extra_message` opens the report (the scheduler passes its
    /// "Unhandled exception" marker here). Each non-final chunk ends with
    /// [`CONTINUATION_MARK`]; only the first chunk carries the tag prefix.
    pub fn exception(&self, error: &dyn Error, extra_message: Option<&str>) {
        if Level::Error < self.min_level.get() {
            return;
        }

        let mut lines = vec![format!("{error}\n")];
        let mut source = error.source();
        while let Some(cause) = source {
            lines.push(format!("caused by: {cause}\n"));
            source = cause.source();
        }

        let mut content = match extra_message {
            Some(extra) => format!("{extra}\n"),
            None => String::new(),
        };
        let mut is_first = true;
        for line in lines {
            if !self.fits(content.len() + line.len(), is_first) {
                content.push(CONTINUATION_MARK);
                self.emit(Level::Error, &content, is_first);
                content.clear();
                is_first = false;
            }
            content.push_str(&line);
        }
        if !content.is_empty() {
            self.emit(Level::Error, &content, is_first);
        }
    }

    fn fits(&self, message_len: usize, is_first: bool) -> bool {
        let prefix_len = if is_first { self.tag.len() + 2 } else { 0 };
        prefix_len + message_len < MESSAGE_LIMIT
    }

    fn emit(&self, level: Level, message: &str, with_prefix: bool) {
        if with_prefix {
            self.router.dispatch(level, &format!("{}: {}", self.tag, message));
        } else {
            self.router.dispatch(level, message);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
