//! Per-machine configuration passed to the factory.

use std::fmt;
use std::sync::Arc;

use crate::error::HsmError;
use crate::graph::StateId;
use crate::planner::SelfTransition;
use crate::trace::{TraceLevel, TraceSink, TracingSink};

/// Snapshot of a machine handed to the dispatch error callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInfo {
    pub name: String,
    pub state: StateId,
    pub state_name: String,
}

/// Callback receiving errors that escaped a task.
pub type ErrorCallback = Arc<dyn Fn(&MachineInfo, &dyn TraceSink, &HsmError) + Send + Sync>;

/// What the scheduler does with an error that escaped every recovery attempt.
#[derive(Clone, Default)]
pub enum ErrorPolicy {
    /// Stop the machine; its [`MachineTask`](crate::MachineTask) resolves to the error.
    #[default]
    Stop,
    /// Report the error and keep draining the queue.
    Callback(ErrorCallback),
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Stop => f.write_str("Stop"),
            ErrorPolicy::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Configuration for machines created by a [`MachineFactory`](crate::MachineFactory).
#[derive(Clone)]
pub struct MachineConfig {
    pub(crate) name: String,
    pub(crate) trace_level: TraceLevel,
    pub(crate) trace_sink: Arc<dyn TraceSink>,
    pub(crate) error_policy: ErrorPolicy,
    pub(crate) initialize: bool,
    pub(crate) self_transition: SelfTransition,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            name: "hsm".to_string(),
            trace_level: TraceLevel::Off,
            trace_sink: Arc::new(TracingSink),
            error_policy: ErrorPolicy::Stop,
            initialize: true,
            self_transition: SelfTransition::Ignore,
        }
    }
}

impl MachineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used in traces and error reports.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_trace_level(mut self, level: TraceLevel) -> Self {
        self.trace_level = level;
        self
    }

    pub fn with_trace_sink(mut self, sink: impl TraceSink + 'static) -> Self {
        self.trace_sink = Arc::new(sink);
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Reports escaped errors to `callback` instead of stopping the machine.
    pub fn on_dispatch_error<F>(self, callback: F) -> Self
    where
        F: Fn(&MachineInfo, &dyn TraceSink, &HsmError) + Send + Sync + 'static,
    {
        self.with_error_policy(ErrorPolicy::Callback(Arc::new(callback)))
    }

    /// Whether machines run the initial `on_entry` descent as their first task.
    pub fn with_initialize(mut self, initialize: bool) -> Self {
        self.initialize = initialize;
        self
    }

    pub fn with_self_transition(mut self, policy: SelfTransition) -> Self {
        self.self_transition = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trace_level(&self) -> TraceLevel {
        self.trace_level
    }
}

impl fmt::Debug for MachineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineConfig")
            .field("name", &self.name)
            .field("trace_level", &self.trace_level)
            .field("error_policy", &self.error_policy)
            .field("initialize", &self.initialize)
            .field("self_transition", &self.self_transition)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_stop_on_error_and_initialize() {
        let config = MachineConfig::default();
        assert_eq!(config.name(), "hsm");
        assert_eq!(config.trace_level(), TraceLevel::Off);
        assert!(matches!(config.error_policy, ErrorPolicy::Stop));
        assert!(config.initialize);
        assert_eq!(config.self_transition, SelfTransition::Ignore);
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = MachineConfig::new()
            .with_name("door")
            .with_trace_level(TraceLevel::Callbacks)
            .with_initialize(false)
            .with_self_transition(SelfTransition::Reenter)
            .on_dispatch_error(|_info, _sink, _err| {});

        assert_eq!(config.name(), "door");
        assert_eq!(config.trace_level(), TraceLevel::Callbacks);
        assert!(!config.initialize);
        assert!(matches!(config.error_policy, ErrorPolicy::Callback(_)));
        assert!(format!("{config:?}").contains("Callback(..)"));
    }
}
