//! Trace output: levels, the sink collaborator and the default `tracing` sink.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How much of a machine's activity is traced. Each level includes the ones below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TraceLevel {
    #[default]
    Off,
    /// Dispatched events, recovery and escalations.
    Events,
    /// Transition plans and state changes.
    Transitions,
    /// Every lifecycle callback invocation.
    Callbacks,
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TraceLevel::Off => "off",
            TraceLevel::Events => "events",
            TraceLevel::Transitions => "transitions",
            TraceLevel::Callbacks => "callbacks",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown trace level '{0}', expected off, events, transitions or callbacks")]
pub struct ParseTraceLevelError(String);

impl FromStr for TraceLevel {
    type Err = ParseTraceLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(TraceLevel::Off),
            "events" | "1" => Ok(TraceLevel::Events),
            "transitions" | "2" => Ok(TraceLevel::Transitions),
            "callbacks" | "3" => Ok(TraceLevel::Callbacks),
            _ => Err(ParseTraceLevelError(s.to_string())),
        }
    }
}

/// Receives formatted trace lines. The return value is never inspected.
pub trait TraceSink: Send + Sync {
    fn write(&self, machine: &str, level: TraceLevel, message: &str);
}

impl<F> TraceSink for F
where
    F: Fn(&str, TraceLevel, &str) + Send + Sync,
{
    fn write(&self, machine: &str, level: TraceLevel, message: &str) {
        self(machine, level, message)
    }
}

/// Forwards trace lines to the `tracing` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn write(&self, machine: &str, level: TraceLevel, message: &str) {
        match level {
            TraceLevel::Off => {}
            TraceLevel::Events => tracing::debug!(machine, "{message}"),
            TraceLevel::Transitions | TraceLevel::Callbacks => {
                tracing::trace!(machine, %level, "{message}")
            }
        }
    }
}

/// Per-instance trace configuration bound to the machine's name.
#[derive(Clone)]
pub(crate) struct Tracer {
    machine: Arc<str>,
    level: TraceLevel,
    sink: Arc<dyn TraceSink>,
}

impl Tracer {
    pub(crate) fn new(machine: Arc<str>, level: TraceLevel, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            machine,
            level,
            sink,
        }
    }

    pub(crate) fn machine(&self) -> Arc<str> {
        Arc::clone(&self.machine)
    }

    pub(crate) fn enabled(&self, level: TraceLevel) -> bool {
        level != TraceLevel::Off && level <= self.level
    }

    pub(crate) fn write(&self, level: TraceLevel, message: fmt::Arguments<'_>) {
        if self.enabled(level) {
            self.sink.write(&self.machine, level, &message.to_string());
        }
    }

    pub(crate) fn sink(&self) -> &dyn TraceSink {
        self.sink.as_ref()
    }
}
