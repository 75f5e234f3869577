// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Logger handle threaded through the registry, the pipeline and sessions.
//
// Every event goes to `tracing`. If the embedding application registered a
// sink, the event is forwarded there too. A sink can never take the engine
// down with it: panics inside a sink are caught and dropped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(s)
    }
}

/// Receiver for log events outside of `tracing`.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message)
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(LogLevel, String)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push((level, message.to_string()));
    }
}

/// Cheap, cloneable logging handle.
///
/// No level threshold is applied here. Filtering belongs to the `tracing`
/// subscriber or to the sink.
#[derive(Clone, Default)]
pub struct Logger {
    sink: Option<Arc<dyn LogSink>>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Logger {
    /// Logger that only emits `tracing` events.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn log(&self, level: LogLevel, component: &str, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(component, "{message}"),
            LogLevel::Warning => tracing::warn!(component, "{message}"),
            LogLevel::Info => tracing::info!(component, "{message}"),
            LogLevel::Debug => tracing::debug!(component, "{message}"),
        }

        let Some(sink) = &self.sink else { return };
        let line = format!("{component}: {message}");
        if catch_unwind(AssertUnwindSafe(|| sink.log(level, &line))).is_err() {
            tracing::warn!(component, "log sink panicked, event dropped");
        }
    }

    pub fn error(&self, component: &str, message: &str) {
        self.log(LogLevel::Error, component, message);
    }

    pub fn warning(&self, component: &str, message: &str) {
        self.log(LogLevel::Warning, component, message);
    }

    pub fn info(&self, component: &str, message: &str) {
        self.log(LogLevel::Info, component, message);
    }

    pub fn debug(&self, component: &str, message: &str) {
        self.log(LogLevel::Debug, component, message);
    }
}
