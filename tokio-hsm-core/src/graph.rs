//! State graph: an arena of states linked to their parents and initial children.
//!
//! The graph is assembled once with [`StateGraphBuilder`] and frozen into an
//! `Arc<StateGraph>` shared by every machine created from it. Handler tables are explicit
//! per state, so "does this state define its own handler" is a map lookup rather than a
//! search.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Callback, ConfigurationError, EventHandlerError, UnhandledEventError};
use crate::event::{Event, Handled};
use crate::handlers::{
    BoxFuture, ErrorHook, EventHandler, HandlerResult, LifecycleHook, UnhandledHook,
};
use crate::instance::Instance;

/// Name given to the fatal state of every graph.
pub const FATAL_STATE_NAME: &str = "Fatal";

static NEXT_GRAPH: AtomicU64 = AtomicU64::new(0);

/// Stable index of a state inside its graph.
///
/// Ids carry the identity of the builder that minted them, so an id from one graph is
/// never mistaken for a state of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId {
    graph: u64,
    index: usize,
}

impl StateId {
    fn new(graph: u64, index: usize) -> Self {
        Self { graph, index }
    }

    /// Position of the state in the graph's arena.
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

pub(crate) struct StateNode<C, E: Event> {
    name: String,
    parent: Option<StateId>,
    initial: Option<StateId>,
    handlers: HashMap<&'static str, EventHandler<C, E>>,
    on_entry: Option<LifecycleHook<C, E>>,
    on_exit: Option<LifecycleHook<C, E>>,
    on_error: Option<ErrorHook<C, E>>,
    on_unhandled: Option<UnhandledHook<C, E>>,
}

impl<C, E: Event> StateNode<C, E> {
    fn new(name: String, parent: Option<StateId>) -> Self {
        Self {
            name,
            parent,
            initial: None,
            handlers: HashMap::new(),
            on_entry: None,
            on_exit: None,
            on_error: None,
            on_unhandled: None,
        }
    }
}

/// Immutable state hierarchy with per-state handler tables.
pub struct StateGraph<C, E: Event> {
    id: u64,
    nodes: Vec<StateNode<C, E>>,
    by_name: HashMap<String, StateId>,
    top: StateId,
    fatal: StateId,
}

impl<C, E: Event> StateGraph<C, E> {
    /// Root of the hierarchy; an ancestor of every state except the fatal state.
    pub fn top(&self) -> StateId {
        self.top
    }

    /// Terminal sink state entered after unrecoverable errors. It has no parent and no
    /// handlers.
    pub fn fatal(&self) -> StateId {
        self.fatal
    }

    /// Number of states, including the top and fatal states.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `state` belongs to this graph.
    pub fn contains(&self, state: StateId) -> bool {
        state.graph == self.id && state.index < self.nodes.len()
    }

    pub fn name(&self, state: StateId) -> &str {
        &self.node(state).name
    }

    /// Looks a state up by its registered name.
    pub fn find(&self, name: &str) -> Option<StateId> {
        self.by_name.get(name).copied()
    }

    pub fn parent_of(&self, state: StateId) -> Option<StateId> {
        self.node(state).parent
    }

    pub fn initial_child_of(&self, state: StateId) -> Option<StateId> {
        self.node(state).initial
    }

    /// Whether `state` itself (not an ancestor) handles `event`.
    pub fn has_own_handler(&self, state: StateId, event: &str) -> bool {
        self.node(state).handlers.contains_key(event)
    }

    /// `state` followed by each of its ancestors, ending at the top state.
    pub fn ancestors(&self, state: StateId) -> impl Iterator<Item = StateId> + '_ {
        std::iter::successors(Some(state), move |s| self.parent_of(*s))
    }

    /// Whether `ancestor` is `state` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: StateId, state: StateId) -> bool {
        self.ancestors(state).any(|s| s == ancestor)
    }

    /// The chain of initial children below `state`, shallowest first, excluding `state`.
    pub fn initial_chain(&self, state: StateId) -> Vec<StateId> {
        std::iter::successors(self.initial_child_of(state), |s| self.initial_child_of(*s))
            .collect()
    }

    /// Follows initial children from `state` down to a state that has none.
    pub fn resolve_leaf(&self, state: StateId) -> StateId {
        self.initial_chain(state).last().copied().unwrap_or(state)
    }

    /// Every state id in arena order.
    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        (0..self.nodes.len()).map(move |index| StateId::new(self.id, index))
    }

    pub(crate) fn handler(&self, state: StateId, event: &str) -> Option<&EventHandler<C, E>> {
        self.node(state).handlers.get(event)
    }

    pub(crate) fn on_entry(&self, state: StateId) -> Option<&LifecycleHook<C, E>> {
        self.node(state).on_entry.as_ref()
    }

    pub(crate) fn on_exit(&self, state: StateId) -> Option<&LifecycleHook<C, E>> {
        self.node(state).on_exit.as_ref()
    }

    pub(crate) fn on_error(&self, state: StateId) -> Option<&ErrorHook<C, E>> {
        self.node(state).on_error.as_ref()
    }

    pub(crate) fn on_unhandled(&self, state: StateId) -> Option<&UnhandledHook<C, E>> {
        self.node(state).on_unhandled.as_ref()
    }

    // Callers check foreign ids with `contains` before they reach here.
    fn node(&self, state: StateId) -> &StateNode<C, E> {
        &self.nodes[state.index]
    }
}

impl<C, E: Event> fmt::Debug for StateGraph<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGraph")
            .field("states", &self.nodes.iter().map(|n| &n.name).collect::<Vec<_>>())
            .field("top", &self.top)
            .field("fatal", &self.fatal)
            .finish()
    }
}

/// Registers states, initial children and handlers, then freezes them into a
/// [`StateGraph`].
///
/// ```rust
/// # use tokio_hsm_core::{Event, Handled, StateGraphBuilder};
/// # #[derive(Debug)] enum Ev { Go }
/// # impl Event for Ev {
/// #     type Reply = ();
/// #     fn name(&self) -> &'static str { "Go" }
/// #     fn names() -> &'static [&'static str] { &["Go"] }
/// # }
/// # fn main() -> Result<(), tokio_hsm_core::ConfigurationError> {
/// let mut builder = StateGraphBuilder::<(), Ev>::new("Top");
/// let top = builder.top();
/// let idle = builder.state("Idle", top)?;
/// let busy = builder.state("Busy", top)?;
/// builder.initial(top, idle)?;
/// builder.on(idle, "Go", move |_m, _e| Box::pin(async move { Ok(Handled::Transition(busy)) }))?;
///
/// let graph = builder.build();
/// assert_eq!(graph.resolve_leaf(top), idle);
/// # Ok(())
/// # }
/// ```
pub struct StateGraphBuilder<C, E: Event> {
    id: u64,
    nodes: Vec<StateNode<C, E>>,
    by_name: HashMap<String, StateId>,
    top: StateId,
    fatal: StateId,
}

impl<C, E> StateGraphBuilder<C, E>
where
    C: Send + 'static,
    E: Event,
{
    /// Starts a graph with the given top state and the fatal state.
    pub fn new(top_name: impl Into<String>) -> Self {
        let top_name = top_name.into();
        let id = NEXT_GRAPH.fetch_add(1, Ordering::Relaxed);
        let top = StateId::new(id, 0);
        let fatal = StateId::new(id, 1);
        let mut by_name = HashMap::new();
        by_name.insert(top_name.clone(), top);
        by_name.insert(FATAL_STATE_NAME.to_string(), fatal);
        Self {
            id,
            nodes: vec![
                StateNode::new(top_name, None),
                StateNode::new(FATAL_STATE_NAME.to_string(), None),
            ],
            by_name,
            top,
            fatal,
        }
    }

    pub fn top(&self) -> StateId {
        self.top
    }

    pub fn fatal(&self) -> StateId {
        self.fatal
    }

    /// Registers a state as a specialization of `parent`.
    pub fn state(
        &mut self,
        name: impl Into<String>,
        parent: StateId,
    ) -> Result<StateId, ConfigurationError> {
        let name = name.into();
        self.check_mutable(parent)?;
        if self.by_name.contains_key(&name) {
            return Err(ConfigurationError::DuplicateState(name));
        }
        let id = StateId::new(self.id, self.nodes.len());
        self.by_name.insert(name.clone(), id);
        self.nodes.push(StateNode::new(name, Some(parent)));
        Ok(id)
    }

    /// Marks `child` as the state `parent` descends into when it is the terminal target of a
    /// transition or the root of initialization.
    pub fn initial(&mut self, parent: StateId, child: StateId) -> Result<(), ConfigurationError> {
        self.check_mutable(parent)?;
        self.check_mutable(child)?;
        if self.nodes[child.index].parent != Some(parent) {
            return Err(ConfigurationError::NotAChild {
                parent: self.nodes[parent.index].name.clone(),
                child: self.nodes[child.index].name.clone(),
            });
        }
        if let Some(existing) = self.nodes[parent.index].initial {
            return Err(ConfigurationError::DuplicateInitialState {
                parent: self.nodes[parent.index].name.clone(),
                existing: self.nodes[existing.index].name.clone(),
                requested: self.nodes[child.index].name.clone(),
            });
        }
        self.nodes[parent.index].initial = Some(child);
        Ok(())
    }

    /// Registers the handler `state` runs for `event`.
    pub fn on<F>(
        &mut self,
        state: StateId,
        event: &str,
        handler: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        F: for<'a> Fn(&'a mut Instance<C, E>, &'a E) -> BoxFuture<'a, HandlerResult<Handled<E::Reply>>>
            + Send
            + Sync
            + 'static,
    {
        self.check_mutable(state)?;
        let node = &mut self.nodes[state.index];
        let Some(event) = E::names().iter().copied().find(|name| *name == event) else {
            return Err(ConfigurationError::UnknownEvent {
                state: node.name.clone(),
                event: event.to_string(),
            });
        };
        if node.handlers.contains_key(event) {
            return Err(ConfigurationError::DuplicateHandler {
                state: node.name.clone(),
                event: event.to_string(),
            });
        }
        node.handlers.insert(event, Arc::new(handler));
        Ok(self)
    }

    pub fn on_entry<F>(&mut self, state: StateId, hook: F) -> Result<&mut Self, ConfigurationError>
    where
        F: for<'a> Fn(&'a mut Instance<C, E>) -> BoxFuture<'a, HandlerResult<()>>
            + Send
            + Sync
            + 'static,
    {
        let slot = self.hook_slot(state, Callback::Entry, |n| &mut n.on_entry)?;
        *slot = Some(Arc::new(hook));
        Ok(self)
    }

    pub fn on_exit<F>(&mut self, state: StateId, hook: F) -> Result<&mut Self, ConfigurationError>
    where
        F: for<'a> Fn(&'a mut Instance<C, E>) -> BoxFuture<'a, HandlerResult<()>>
            + Send
            + Sync
            + 'static,
    {
        let slot = self.hook_slot(state, Callback::Exit, |n| &mut n.on_exit)?;
        *slot = Some(Arc::new(hook));
        Ok(self)
    }

    /// Registers the recovery callback for handler failures in `state` and its descendants.
    pub fn on_error<F>(&mut self, state: StateId, hook: F) -> Result<&mut Self, ConfigurationError>
    where
        F: for<'a> Fn(&'a mut Instance<C, E>, &'a EventHandlerError) -> BoxFuture<'a, HandlerResult<()>>
            + Send
            + Sync
            + 'static,
    {
        let slot = self.hook_slot(state, Callback::Error, |n| &mut n.on_error)?;
        *slot = Some(Arc::new(hook));
        Ok(self)
    }

    /// Registers the recovery callback for unhandled events in `state` and its descendants.
    pub fn on_unhandled<F>(
        &mut self,
        state: StateId,
        hook: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        F: for<'a> Fn(&'a mut Instance<C, E>, &'a UnhandledEventError) -> BoxFuture<'a, HandlerResult<()>>
            + Send
            + Sync
            + 'static,
    {
        let slot = self.hook_slot(state, Callback::Unhandled, |n| &mut n.on_unhandled)?;
        *slot = Some(Arc::new(hook));
        Ok(self)
    }

    /// Freezes the graph.
    pub fn build(self) -> Arc<StateGraph<C, E>> {
        Arc::new(StateGraph {
            id: self.id,
            nodes: self.nodes,
            by_name: self.by_name,
            top: self.top,
            fatal: self.fatal,
        })
    }

    fn check_mutable(&self, state: StateId) -> Result<(), ConfigurationError> {
        if state.graph != self.id || state.index >= self.nodes.len() {
            return Err(ConfigurationError::UnknownState(state.index));
        }
        if state == self.fatal {
            return Err(ConfigurationError::FatalState);
        }
        Ok(())
    }

    fn hook_slot<H>(
        &mut self,
        state: StateId,
        callback: Callback,
        slot: impl FnOnce(&mut StateNode<C, E>) -> &mut Option<H>,
    ) -> Result<&mut Option<H>, ConfigurationError> {
        self.check_mutable(state)?;
        let node = &mut self.nodes[state.index];
        let name = node.name.clone();
        let slot = slot(node);
        if slot.is_some() {
            return Err(ConfigurationError::DuplicateCallback { state: name, callback });
        }
        Ok(slot)
    }
}
