//! Machine creation.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::MachineConfig;
use crate::engine::DispatchEngine;
use crate::event::Event;
use crate::graph::StateGraph;
use crate::instance::Instance;
use crate::planner::TransitionPlanner;
use crate::queue::{Handle, MachineTask, Scheduler, Task};
use crate::trace::Tracer;

/// Creates machines sharing one state graph and configuration.
///
/// ```rust,no_run
/// # use tokio_hsm_core::{Event, MachineConfig, MachineFactory, StateGraphBuilder};
/// # #[derive(Debug)] enum Ev { Go }
/// # impl Event for Ev {
/// #     type Reply = ();
/// #     fn name(&self) -> &'static str { "Go" }
/// #     fn names() -> &'static [&'static str] { &["Go"] }
/// # }
/// # async fn run() {
/// let graph = StateGraphBuilder::<u32, Ev>::new("Top").build();
/// let factory = MachineFactory::new(graph).with_config(MachineConfig::new().with_name("counter"));
///
/// let (handle, task) = factory.create(0);
/// handle.post(Ev::Go).unwrap();
/// handle.shutdown_graceful();
/// let context = task.await.unwrap();
/// # }
/// ```
pub struct MachineFactory<C, E: Event> {
    graph: Arc<StateGraph<C, E>>,
    config: MachineConfig,
}

impl<C, E> MachineFactory<C, E>
where
    C: Send + 'static,
    E: Event,
{
    pub fn new(graph: Arc<StateGraph<C, E>>) -> Self {
        Self {
            graph,
            config: MachineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<StateGraph<C, E>> {
        &self.graph
    }

    /// Spawns a machine owning `context` on the current Tokio runtime.
    ///
    /// The machine starts in the top state. When the configuration asks for it, the
    /// initial `on_entry` descent is the first queued task, so it completes before any
    /// event posted through the returned handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn create(&self, context: C) -> (Handle<C, E>, MachineTask<C>) {
        let name: Arc<str> = Arc::from(self.config.name.as_str());
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(self.graph.top());
        let (shutdown_tx, shutdown_rx) = watch::channel(None);

        let tracer = Tracer::new(
            Arc::clone(&name),
            self.config.trace_level,
            Arc::clone(&self.config.trace_sink),
        );
        let instance = Instance::new(
            Arc::clone(&self.graph),
            context,
            task_tx.downgrade(),
            state_tx,
            tracer,
        );
        let engine = DispatchEngine::new(
            Arc::clone(&self.graph),
            TransitionPlanner::new(self.config.self_transition),
            instance,
        );

        if self.config.initialize {
            // The receiver is alive until the scheduler is spawned below.
            let _ = task_tx.send(Task::Initialize);
        }

        let scheduler = Scheduler::new(
            engine,
            task_rx,
            shutdown_rx,
            self.config.error_policy.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        (
            Handle {
                name,
                graph: Arc::clone(&self.graph),
                tasks: task_tx,
                state_rx,
                shutdown_tx: Arc::new(shutdown_tx),
            },
            MachineTask { handle },
        )
    }
}
