//! Core runtime for tokio-hsm.
//!
//! A machine is a tree of states built once with [`StateGraphBuilder`], plus one
//! [`Instance`] per running machine holding the context value and the current state.
//! [`MachineFactory::create`] spawns a scheduler task that drains the machine's queue one
//! task at a time; [`Handle`] feeds that queue from the outside.

mod config;
mod engine;
mod error;
mod event;
mod factory;
mod graph;
mod handlers;
mod instance;
mod planner;
mod queue;
mod trace;

pub use config::{ErrorCallback, ErrorPolicy, MachineConfig, MachineInfo};
pub use error::{
    BoxError, Callback, ConfigurationError, EventHandlerError, FatalError, HsmError,
    InitializationError, ShutdownMode, TaskError, TransitionError, UnhandledEventError,
};
pub use event::{Event, Handled};
pub use factory::MachineFactory;
pub use graph::{FATAL_STATE_NAME, StateGraph, StateGraphBuilder, StateId};
pub use handlers::{
    BoxFuture, ErrorHook, EventHandler, HandlerResult, LifecycleHook, UnhandledHook,
};
pub use instance::Instance;
pub use planner::{SelfTransition, Transition, TransitionPlanner};
pub use queue::{DeferredPost, Handle, MachineTask};
pub use trace::{ParseTraceLevelError, TraceLevel, TraceSink, TracingSink};
