//! The machine instance record seen by handler code.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::config::MachineInfo;
use crate::error::{BoxError, ConfigurationError, EventHandlerError, HsmError, UnhandledEventError};
use crate::event::Event;
use crate::graph::{StateGraph, StateId};
use crate::queue::{DeferredPost, Task};
use crate::trace::{TraceLevel, Tracer};

/// Event currently being dispatched. The payload is only rendered when an error needs it.
#[derive(Debug)]
struct InFlight {
    name: &'static str,
    payload: Option<String>,
}

/// Binds a context value to a current state.
///
/// Handlers and lifecycle callbacks receive `&mut Instance`. Every mutation happens inside a
/// task drained by the machine's scheduler, so handlers never race each other.
pub struct Instance<C, E: Event> {
    name: Arc<str>,
    graph: Arc<StateGraph<C, E>>,
    context: C,
    current: StateId,
    pending: Option<StateId>,
    event: Option<InFlight>,
    tasks: mpsc::WeakUnboundedSender<Task<C, E>>,
    state_tx: watch::Sender<StateId>,
    tracer: Tracer,
}

impl<C, E> Instance<C, E>
where
    C: Send + 'static,
    E: Event,
{
    pub(crate) fn new(
        graph: Arc<StateGraph<C, E>>,
        context: C,
        tasks: mpsc::WeakUnboundedSender<Task<C, E>>,
        state_tx: watch::Sender<StateId>,
        tracer: Tracer,
    ) -> Self {
        let current = *state_tx.borrow();
        Self {
            name: tracer.machine(),
            graph,
            context,
            current,
            pending: None,
            event: None,
            tasks,
            state_tx,
            tracer,
        }
    }

    /// Machine name from its configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn graph(&self) -> &StateGraph<C, E> {
        &self.graph
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn current_state_name(&self) -> &str {
        self.graph.name(self.current)
    }

    /// Looks a state up by name.
    pub fn state(&self, name: &str) -> Option<StateId> {
        self.graph.find(name)
    }

    /// Requests a transition once the running handler returns. A later request replaces an
    /// earlier one. A target from another graph fails the dispatch with
    /// [`ConfigurationError::UnknownState`].
    pub fn transition(&mut self, target: StateId) {
        self.pending = Some(target);
    }

    pub fn pending_transition(&self) -> Option<StateId> {
        self.pending
    }

    /// Name of the event being dispatched, if any.
    pub fn event_name(&self) -> Option<&'static str> {
        self.event.as_ref().map(|e| e.name)
    }

    /// Signals that the running handler declines the event.
    ///
    /// Return it from the handler (`return Err(instance.unhandled())`) to run unhandled-event
    /// recovery as if no handler had been found.
    pub fn unhandled(&self) -> BoxError {
        Box::new(self.unhandled_error())
    }

    /// Enqueues an event behind every task already queued.
    pub fn post(&self, event: E) -> Result<(), HsmError> {
        let tasks = self.tasks.upgrade().ok_or_else(|| self.closed())?;
        tasks
            .send(Task::Dispatch { event, reply: None })
            .map_err(|_| self.closed())
    }

    /// Enqueues an event once `delay` has elapsed. The timer does not keep the machine
    /// alive; if every handle is gone when it fires, the event is dropped.
    pub fn deferred_post(&self, delay: Duration, event: E) -> Result<DeferredPost, HsmError> {
        if self.tasks.upgrade().is_none() {
            return Err(self.closed());
        }
        Ok(DeferredPost::schedule(self.tasks.clone(), delay, event))
    }

    /// Replaces the current state and context without running any callbacks.
    ///
    /// Fails with [`ConfigurationError::UnknownState`] if `state` belongs to another graph;
    /// the instance is left untouched in that case.
    pub fn restore(&mut self, state: StateId, context: C) -> Result<(), HsmError> {
        if !self.graph.contains(state) {
            return Err(ConfigurationError::UnknownState(state.index()).into());
        }
        self.context = context;
        self.set_current(state);
        self.tracer.write(
            TraceLevel::Transitions,
            format_args!("restored to {}", self.graph.name(state)),
        );
        Ok(())
    }

    /// Writes a line to the machine's trace sink if `level` is enabled.
    pub fn trace(&self, level: TraceLevel, message: &str) {
        self.tracer.write(level, format_args!("{message}"));
    }

    pub(crate) fn set_current(&mut self, state: StateId) {
        self.current = state;
        self.state_tx.send_replace(state);
    }

    pub(crate) fn take_pending(&mut self) -> Option<StateId> {
        self.pending.take()
    }

    pub(crate) fn begin_event(&mut self, event: &E) {
        self.event = Some(InFlight {
            name: event.name(),
            payload: None,
        });
    }

    /// Renders the in-flight payload; called before any error is built for this event.
    pub(crate) fn capture_payload(&mut self, event: &E) {
        if let Some(in_flight) = &mut self.event {
            if in_flight.payload.is_none() {
                in_flight.payload = Some(format!("{event:?}"));
            }
        }
    }

    pub(crate) fn end_event(&mut self) {
        self.event = None;
        self.pending = None;
    }

    pub(crate) fn unhandled_error(&self) -> UnhandledEventError {
        let (event, payload) = match &self.event {
            Some(in_flight) => (in_flight.name, in_flight.payload.clone().unwrap_or_default()),
            None => ("<none>", String::new()),
        };
        UnhandledEventError {
            state: self.current_state_name().to_string(),
            event,
            payload,
        }
    }

    /// Fills in the payload of an error raised through [`Instance::unhandled`] before the
    /// payload was rendered.
    pub(crate) fn fill_payload(&self, mut err: UnhandledEventError) -> UnhandledEventError {
        if let Some(InFlight { name, payload: Some(payload) }) = &self.event {
            if err.event == *name && err.payload.is_empty() {
                err.payload = payload.clone();
            }
        }
        err
    }

    pub(crate) fn handler_error(&self, cause: BoxError) -> EventHandlerError {
        let unhandled = self.unhandled_error();
        EventHandlerError {
            state: unhandled.state,
            event: unhandled.event,
            payload: unhandled.payload,
            cause,
        }
    }

    pub(crate) fn info(&self) -> MachineInfo {
        MachineInfo {
            name: self.name.to_string(),
            state: self.current,
            state_name: self.current_state_name().to_string(),
        }
    }

    pub(crate) fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub(crate) fn closed(&self) -> HsmError {
        HsmError::Closed(self.name.to_string())
    }

    pub(crate) fn into_context(self) -> C {
        self.context
    }
}
