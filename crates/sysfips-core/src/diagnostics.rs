//! Best-effort diagnostic side channel. Nothing here can change the outcome
//! of a status query: a missing or dropped sink silently disables output.

use std::fmt::{self, Write};
use std::sync::{Arc, Weak};

/// Upper bound (in bytes) on a single diagnostic line.
pub const MSG_MAX_SIZE: usize = 96;

/// Log target used by [`LogSink`].
pub const LOG_TARGET: &str = "sysfips::diag";

/// Consumer of single-line debug messages, owned by the embedding host.
pub trait DiagnosticSink: Send + Sync {
    fn println(&self, line: &str);
}

/// Sink that forwards every line to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn println(&self, line: &str) {
        log::debug!(target: LOG_TARGET, "{line}");
    }
}

/// Non-owning handle to an optional [`DiagnosticSink`].
#[derive(Clone, Default)]
pub struct Diagnostics {
    sink: Option<Weak<dyn DiagnosticSink>>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("attached", &self.is_enabled())
            .finish()
    }
}

impl Diagnostics {
    pub fn new(sink: Option<Weak<dyn DiagnosticSink>>) -> Self {
        Self { sink }
    }

    /// Diagnostics that go nowhere.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Convenience for callers holding the strong reference themselves.
    pub fn attach(sink: &Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink: Some(Arc::downgrade(sink)),
        }
    }

    /// True while a sink is attached and still alive.
    pub fn is_enabled(&self) -> bool {
        self.sink
            .as_ref()
            .map(|weak| weak.strong_count() > 0)
            .unwrap_or(false)
    }

    /// Emit a fixed message.
    pub fn print(&self, msg: &str) {
        if let Some(sink) = self.sink.as_ref().and_then(Weak::upgrade) {
            sink.println(msg);
        }
    }

    /// Format `args` and emit it when it fits in [`MSG_MAX_SIZE`]; otherwise
    /// emit `fallback` instead.
    pub fn render(&self, args: fmt::Arguments<'_>, fallback: &str) {
        let Some(sink) = self.sink.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        match bounded_format(args) {
            Some(line) => sink.println(&line),
            None => sink.println(fallback),
        }
    }
}

/// Render `args`, giving up as soon as the output reaches the bound.
pub fn bounded_format(args: fmt::Arguments<'_>) -> Option<String> {
    let mut buf = BoundedBuf {
        inner: String::with_capacity(MSG_MAX_SIZE),
    };
    buf.write_fmt(args).ok()?;
    Some(buf.inner)
}

struct BoundedBuf {
    inner: String,
}

impl Write for BoundedBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Strictly below the bound, leaving room for a C-style terminator.
        if self.inner.len() + s.len() >= MSG_MAX_SIZE {
            return Err(fmt::Error);
        }
        self.inner.push_str(s);
        Ok(())
    }
}
