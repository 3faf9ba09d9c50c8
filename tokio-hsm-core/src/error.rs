//! Error taxonomy for state graph construction, dispatch and recovery.
//!
//! Every error that escapes a task is delivered as an [`HsmError`]. Errors raised by user
//! callbacks are plain [`BoxError`]s; the engine inspects them to decide which recovery
//! protocol applies (see [`HsmError`] for the variants that carry protocol meaning).

use std::fmt;

/// Error type accepted from user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Lifecycle callback identifiers, used to report which callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    /// `on_entry`
    Entry,
    /// `on_exit`
    Exit,
    /// `on_error`
    Error,
    /// `on_unhandled`
    Unhandled,
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Callback::Entry => "on_entry",
            Callback::Exit => "on_exit",
            Callback::Error => "on_error",
            Callback::Unhandled => "on_unhandled",
        })
    }
}

/// A state graph was declared inconsistently.
///
/// Raised synchronously by [`StateGraphBuilder`](crate::StateGraphBuilder); never produced
/// while a machine is running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// A parent was given a second initial child.
    #[error("state '{parent}' already has initial state '{existing}', cannot also mark '{requested}'")]
    DuplicateInitialState {
        parent: String,
        existing: String,
        requested: String,
    },

    /// An initial child must be a direct child of the state it is registered on.
    #[error("state '{child}' is not a direct child of '{parent}'")]
    NotAChild { parent: String, child: String },

    /// Two states were registered with the same name.
    #[error("state '{0}' is already registered")]
    DuplicateState(String),

    /// A `StateId` that does not belong to this graph.
    #[error("unknown state id {0}")]
    UnknownState(usize),

    /// A handler was registered for a name the event type never produces.
    #[error("state '{state}' registers a handler for unknown event '{event}'")]
    UnknownEvent { state: String, event: String },

    /// A state registered two handlers for the same event.
    #[error("state '{state}' already handles event '{event}'")]
    DuplicateHandler { state: String, event: String },

    /// A state registered the same lifecycle callback twice.
    #[error("state '{state}' already defines {callback}")]
    DuplicateCallback { state: String, callback: Callback },

    /// The fatal state cannot have children, handlers or callbacks.
    #[error("the fatal state cannot be modified")]
    FatalState,
}

/// No state in the active chain handles the event, or a handler declined it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unhandled event '{event}' in state '{state}'")]
pub struct UnhandledEventError {
    /// Name of the state the machine was in.
    pub state: String,
    /// Event name.
    pub event: &'static str,
    /// Debug rendering of the event payload.
    pub payload: String,
}

/// An event handler failed.
#[derive(Debug, thiserror::Error)]
#[error("handler for '{event}' failed in state '{state}': {cause}")]
pub struct EventHandlerError {
    pub state: String,
    pub event: &'static str,
    pub payload: String,
    #[source]
    pub cause: BoxError,
}

/// An `on_entry` or `on_exit` callback failed while a transition was executing.
#[derive(Debug, thiserror::Error)]
#[error("{callback} of '{state}' failed during transition '{from}' -> '{to}': {cause}")]
pub struct TransitionError {
    /// State whose callback failed.
    pub state: String,
    pub callback: Callback,
    /// State the transition started from.
    pub from: String,
    /// State the transition was requested to.
    pub to: String,
    #[source]
    pub cause: BoxError,
}

/// An error survived every recovery level; the machine is now in the fatal state.
#[derive(Debug, thiserror::Error)]
#[error("machine '{machine}' entered the fatal state: {cause}")]
pub struct FatalError {
    pub machine: String,
    #[source]
    pub cause: BoxError,
}

/// An `on_entry` callback failed while descending the initial chain at creation.
#[derive(Debug, thiserror::Error)]
#[error("initialization failed in on_entry of '{state}': {cause}")]
pub struct InitializationError {
    pub state: String,
    #[source]
    pub cause: BoxError,
}

/// Any error produced by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum HsmError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Unhandled(#[from] UnhandledEventError),

    #[error(transparent)]
    Handler(#[from] EventHandlerError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error(transparent)]
    Initialization(#[from] InitializationError),

    /// The machine's task has stopped and no longer accepts work.
    #[error("machine '{0}' is no longer running")]
    Closed(String),
}

impl HsmError {
    /// Returns true if this error left the machine in the fatal state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HsmError::Fatal(_) | HsmError::Initialization(_))
    }
}

/// Shutdown mode for the machine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Graceful shutdown: every task already queued runs before the machine stops and
    /// returns its context.
    Graceful,
    /// Immediate shutdown: the machine stops after the task in flight, dropping the rest of
    /// the queue, and returns its context.
    Immediate,
}

/// Error returned by the machine's background task.
///
/// Distinguishes an error that stopped the machine under
/// [`ErrorPolicy::Stop`](crate::ErrorPolicy::Stop) from a failure of the Tokio task itself.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// An error escaped a task and the error policy stopped the machine.
    #[error("machine error: {0}")]
    Machine(HsmError),
    /// The background task panicked or was aborted.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// What a user callback raised, classified for the recovery protocols.
pub(crate) enum Raised {
    Unhandled(UnhandledEventError),
    Transition(TransitionError),
    Other(BoxError),
}

impl From<BoxError> for Raised {
    fn from(err: BoxError) -> Self {
        let err = match err.downcast::<UnhandledEventError>() {
            Ok(unhandled) => return Raised::Unhandled(*unhandled),
            Err(err) => err,
        };
        let err = match err.downcast::<TransitionError>() {
            Ok(transition) => return Raised::Transition(*transition),
            Err(err) => err,
        };
        match err.downcast::<HsmError>() {
            Ok(hsm) => match *hsm {
                HsmError::Unhandled(unhandled) => Raised::Unhandled(unhandled),
                HsmError::Transition(transition) => Raised::Transition(transition),
                other => Raised::Other(Box::new(other)),
            },
            Err(err) => Raised::Other(err),
        }
    }
}
