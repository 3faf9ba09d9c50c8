//! Dispatch engine: handler lookup, recovery chains and transition execution.
//!
//! One engine drives one machine instance. Every method runs inside a task popped by the
//! scheduler, so the engine is never re-entered while a callback is suspended.

use std::sync::Arc;

use crate::config::MachineInfo;
use crate::error::{
    BoxError, Callback, ConfigurationError, FatalError, HsmError, InitializationError, Raised,
    TransitionError, UnhandledEventError,
};
use crate::event::{Event, Handled};
use crate::graph::{StateGraph, StateId};
use crate::handlers::{ErrorHook, EventHandler, UnhandledHook};
use crate::instance::Instance;
use crate::planner::{Transition, TransitionPlanner};
use crate::trace::{TraceLevel, TraceSink};

pub(crate) struct DispatchEngine<C, E: Event> {
    graph: Arc<StateGraph<C, E>>,
    planner: TransitionPlanner,
    instance: Instance<C, E>,
}

impl<C, E> DispatchEngine<C, E>
where
    C: Send + 'static,
    E: Event,
{
    pub(crate) fn new(
        graph: Arc<StateGraph<C, E>>,
        planner: TransitionPlanner,
        instance: Instance<C, E>,
    ) -> Self {
        Self {
            graph,
            planner,
            instance,
        }
    }

    /// Enters the top state and every initial child below it, parent first.
    pub(crate) async fn initialize(&mut self) -> Result<(), HsmError> {
        let top = self.graph.top();
        let mut path = vec![top];
        path.extend(self.graph.initial_chain(top));
        self.trace(
            TraceLevel::Events,
            format_args!("initializing into {}", self.graph.name(self.graph.resolve_leaf(top))),
        );

        for &state in &path {
            if let Err(cause) = self.run_entry(state).await {
                let err = InitializationError {
                    state: self.graph.name(state).to_string(),
                    cause,
                };
                self.instance.set_current(self.graph.fatal());
                tracing::warn!(
                    machine = self.instance.name(),
                    error = %err,
                    "initialization failed, machine is in the fatal state"
                );
                return Err(err.into());
            }
        }

        if let Some(&leaf) = path.last() {
            self.instance.set_current(leaf);
        }
        Ok(())
    }

    /// Runs one event through lookup, the handler and any recovery it needs.
    ///
    /// Returns the handler's reply, if it produced one.
    pub(crate) async fn dispatch(&mut self, event: E) -> Result<Option<E::Reply>, HsmError> {
        self.instance.begin_event(&event);
        if self.instance.tracer().enabled(TraceLevel::Events) {
            self.trace(
                TraceLevel::Events,
                format_args!("{:?} in {}", event, self.instance.current_state_name()),
            );
        }
        let result = self.handle_event(&event).await;
        self.instance.end_event();
        result
    }

    /// Replaces state and context without running callbacks.
    pub(crate) fn restore(&mut self, state: StateId, context: C) -> Result<(), HsmError> {
        self.instance.restore(state, context)
    }

    pub(crate) fn info(&self) -> MachineInfo {
        self.instance.info()
    }

    pub(crate) fn sink(&self) -> &dyn TraceSink {
        self.instance.tracer().sink()
    }

    pub(crate) fn name(&self) -> &str {
        self.instance.name()
    }

    pub(crate) fn into_context(self) -> C {
        self.instance.into_context()
    }

    async fn handle_event(&mut self, event: &E) -> Result<Option<E::Reply>, HsmError> {
        let Some(handler) = self.find_handler(event.name()) else {
            self.instance.capture_payload(event);
            let err = self.instance.unhandled_error();
            return self.recover_unhandled(err).await.map(|()| None);
        };

        match handler(&mut self.instance, event).await {
            Ok(handled) => {
                let reply = match handled {
                    Handled::Stay => None,
                    Handled::Transition(target) => {
                        self.instance.transition(target);
                        None
                    }
                    Handled::Reply(reply) => Some(reply),
                };
                self.run_pending().await?;
                Ok(reply)
            }
            Err(raised) => {
                // A transition requested before the failure is not honoured.
                self.instance.take_pending();
                self.instance.capture_payload(event);
                match Raised::from(raised) {
                    Raised::Unhandled(err) => {
                        let err = self.instance.fill_payload(err);
                        self.recover_unhandled(err).await.map(|()| None)
                    }
                    Raised::Transition(err) => Err(err.into()),
                    Raised::Other(cause) => self.recover_error(cause).await.map(|()| None),
                }
            }
        }
    }

    /// Nearest state, starting at the current one, that defines its own handler.
    fn find_handler(&self, event: &str) -> Option<EventHandler<C, E>> {
        self.graph
            .ancestors(self.instance.current_state())
            .find_map(|state| self.graph.handler(state, event))
            .cloned()
    }

    fn find_unhandled_hook(&self) -> Option<UnhandledHook<C, E>> {
        self.graph
            .ancestors(self.instance.current_state())
            .find_map(|state| self.graph.on_unhandled(state))
            .cloned()
    }

    fn find_error_hook(&self) -> Option<ErrorHook<C, E>> {
        self.graph
            .ancestors(self.instance.current_state())
            .find_map(|state| self.graph.on_error(state))
            .cloned()
    }

    async fn recover_unhandled(&mut self, err: UnhandledEventError) -> Result<(), HsmError> {
        self.instance.take_pending();
        let Some(hook) = self.find_unhandled_hook() else {
            self.trace(TraceLevel::Events, format_args!("escalating: {err}"));
            return Err(err.into());
        };

        self.trace(TraceLevel::Events, format_args!("recovering: {err}"));
        match hook(&mut self.instance, &err).await {
            Ok(()) => self.finish_recovery().await,
            Err(raised) => {
                self.instance.take_pending();
                match Raised::from(raised) {
                    Raised::Transition(err) => Err(self.force_fatal(Box::new(err))),
                    Raised::Unhandled(err) => Err(err.into()),
                    Raised::Other(cause) => self.recover_error(cause).await,
                }
            }
        }
    }

    async fn recover_error(&mut self, cause: BoxError) -> Result<(), HsmError> {
        self.instance.take_pending();
        let err = self.instance.handler_error(cause);
        let Some(hook) = self.find_error_hook() else {
            self.trace(TraceLevel::Events, format_args!("escalating: {err}"));
            return Err(err.into());
        };

        self.trace(TraceLevel::Events, format_args!("recovering: {err}"));
        match hook(&mut self.instance, &err).await {
            Ok(()) => self.finish_recovery().await,
            Err(raised) => {
                self.instance.take_pending();
                match Raised::from(raised) {
                    Raised::Transition(err) => Err(self.force_fatal(Box::new(err))),
                    Raised::Unhandled(err) => Err(self.enter_fatal(Box::new(err)).await),
                    Raised::Other(cause) => Err(self.enter_fatal(cause).await),
                }
            }
        }
    }

    /// Runs the transition a recovery hook requested. Its failure is fatal.
    async fn finish_recovery(&mut self) -> Result<(), HsmError> {
        match self.run_pending().await {
            Ok(()) => Ok(()),
            Err(HsmError::Transition(err)) => Err(self.force_fatal(Box::new(err))),
            Err(err) => Err(self.force_fatal(Box::new(err))),
        }
    }

    /// Walks the regular exit path into the fatal state, forcing it if an exit fails.
    async fn enter_fatal(&mut self, cause: BoxError) -> HsmError {
        let fatal = self.graph.fatal();
        let plan = self
            .planner
            .plan(&self.graph, self.instance.current_state(), fatal);
        let cause = match self.execute(&plan).await {
            Ok(()) => cause,
            Err(err) => Box::new(err),
        };
        self.force_fatal(cause)
    }

    fn force_fatal(&mut self, cause: BoxError) -> HsmError {
        self.instance.set_current(self.graph.fatal());
        tracing::warn!(
            machine = self.instance.name(),
            cause = %cause,
            "machine forced into the fatal state"
        );
        self.trace(TraceLevel::Events, format_args!("fatal: {cause}"));
        FatalError {
            machine: self.instance.name().to_string(),
            cause,
        }
        .into()
    }

    async fn run_pending(&mut self) -> Result<(), HsmError> {
        let Some(target) = self.instance.take_pending() else {
            return Ok(());
        };
        if !self.graph.contains(target) {
            return Err(ConfigurationError::UnknownState(target.index()).into());
        }
        let plan = self
            .planner
            .plan(&self.graph, self.instance.current_state(), target);
        self.execute(&plan).await?;
        Ok(())
    }

    /// Runs the exit callbacks then the entry callbacks of `plan`.
    ///
    /// Only callbacks a state defines itself run. Transition requests made by these
    /// callbacks are dropped.
    async fn execute(&mut self, plan: &Transition) -> Result<(), TransitionError> {
        if self.instance.tracer().enabled(TraceLevel::Transitions) {
            self.trace(
                TraceLevel::Transitions,
                format_args!(
                    "{} -> {}: exit [{}] enter [{}]",
                    self.graph.name(plan.from()),
                    self.graph.name(plan.to()),
                    self.names(plan.exits()),
                    self.names(plan.entries()),
                ),
            );
        }

        for &state in plan.exits() {
            if let Some(hook) = self.graph.on_exit(state) {
                self.instance.tracer().write(
                    TraceLevel::Callbacks,
                    format_args!("on_exit {}", self.graph.name(state)),
                );
                let result = hook(&mut self.instance).await;
                self.instance.take_pending();
                if let Err(cause) = result {
                    return Err(self.transition_error(plan, state, Callback::Exit, cause));
                }
            }
        }

        for &state in plan.entries() {
            if let Err(cause) = self.run_entry(state).await {
                return Err(self.transition_error(plan, state, Callback::Entry, cause));
            }
        }

        self.instance.set_current(plan.resting());
        self.trace(
            TraceLevel::Transitions,
            format_args!("now in {}", self.graph.name(plan.resting())),
        );
        Ok(())
    }

    async fn run_entry(&mut self, state: StateId) -> Result<(), BoxError> {
        let Some(hook) = self.graph.on_entry(state) else {
            return Ok(());
        };
        self.instance.tracer().write(
            TraceLevel::Callbacks,
            format_args!("on_entry {}", self.graph.name(state)),
        );
        let result = hook(&mut self.instance).await;
        self.instance.take_pending();
        result
    }

    fn transition_error(
        &self,
        plan: &Transition,
        state: StateId,
        callback: Callback,
        cause: BoxError,
    ) -> TransitionError {
        TransitionError {
            state: self.graph.name(state).to_string(),
            callback,
            from: self.graph.name(plan.from()).to_string(),
            to: self.graph.name(plan.to()).to_string(),
            cause,
        }
    }

    fn names(&self, states: &[StateId]) -> String {
        states
            .iter()
            .map(|&s| self.graph.name(s))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn trace(&self, level: TraceLevel, message: std::fmt::Arguments<'_>) {
        self.instance.tracer().write(level, message);
    }
}
