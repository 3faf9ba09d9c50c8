//! Per-machine task queue, the scheduler draining it and the handles that feed it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ErrorPolicy;
use crate::engine::DispatchEngine;
use crate::error::{HsmError, ShutdownMode, TaskError};
use crate::event::Event;
use crate::graph::{StateGraph, StateId};

/// Channel a `call` waits on for the outcome of its dispatch.
pub(crate) type ReplySender<E> = oneshot::Sender<Result<Option<<E as Event>::Reply>, HsmError>>;

/// Unit of work run against a machine. Tasks never overlap.
pub(crate) enum Task<C, E: Event> {
    Initialize,
    Dispatch {
        event: E,
        reply: Option<ReplySender<E>>,
    },
    Barrier(oneshot::Sender<()>),
    Restore {
        state: StateId,
        context: C,
    },
}

/// Single consumer of a machine's queue.
pub(crate) struct Scheduler<C, E: Event> {
    engine: DispatchEngine<C, E>,
    tasks: mpsc::UnboundedReceiver<Task<C, E>>,
    shutdown: watch::Receiver<Option<ShutdownMode>>,
    policy: ErrorPolicy,
}

impl<C, E> Scheduler<C, E>
where
    C: Send + 'static,
    E: Event,
{
    pub(crate) fn new(
        engine: DispatchEngine<C, E>,
        tasks: mpsc::UnboundedReceiver<Task<C, E>>,
        shutdown: watch::Receiver<Option<ShutdownMode>>,
        policy: ErrorPolicy,
    ) -> Self {
        Self {
            engine,
            tasks,
            shutdown,
            policy,
        }
    }

    /// Drains tasks until shutdown, until every handle is dropped, or until an error stops
    /// the machine.
    pub(crate) async fn run(mut self) -> Result<C, HsmError> {
        let mut shutdown_open = true;

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed(), if shutdown_open => {
                    if changed.is_err() {
                        shutdown_open = false;
                        continue;
                    }
                    let mode = *self.shutdown.borrow();
                    match mode {
                        Some(ShutdownMode::Immediate) => break,
                        Some(ShutdownMode::Graceful) => {
                            while let Ok(task) = self.tasks.try_recv() {
                                self.run_task(task).await?;
                            }
                            break;
                        }
                        None => {}
                    }
                }
                task = self.tasks.recv() => {
                    let Some(task) = task else { break };
                    self.run_task(task).await?;
                }
            }
        }

        tracing::debug!(machine = self.engine.name(), "machine stopped");
        Ok(self.engine.into_context())
    }

    async fn run_task(&mut self, task: Task<C, E>) -> Result<(), HsmError> {
        match task {
            Task::Initialize => {
                let result = self.engine.initialize().await;
                self.settle(result)
            }
            Task::Dispatch { event, reply: None } => {
                let result = self.engine.dispatch(event).await.map(drop);
                self.settle(result)
            }
            Task::Dispatch {
                event,
                reply: Some(reply),
            } => {
                // The caller owns the error; the policy never sees it.
                let result = self.engine.dispatch(event).await;
                let _ = reply.send(result);
                Ok(())
            }
            Task::Barrier(done) => {
                let _ = done.send(());
                Ok(())
            }
            Task::Restore { state, context } => {
                let result = self.engine.restore(state, context);
                self.settle(result)
            }
        }
    }

    fn settle(&self, result: Result<(), HsmError>) -> Result<(), HsmError> {
        let Err(err) = result else {
            return Ok(());
        };
        match &self.policy {
            ErrorPolicy::Stop => {
                tracing::error!(
                    machine = self.engine.name(),
                    error = %err,
                    "error escaped dispatch, stopping machine"
                );
                Err(err)
            }
            ErrorPolicy::Callback(callback) => {
                callback(&self.engine.info(), self.engine.sink(), &err);
                Ok(())
            }
        }
    }
}

/// Handle for driving a running machine from outside its handlers.
///
/// Cloning is cheap. The machine stops once every handle has been dropped and its queue is
/// empty.
pub struct Handle<C, E: Event> {
    pub(crate) name: Arc<str>,
    pub(crate) graph: Arc<StateGraph<C, E>>,
    pub(crate) tasks: mpsc::UnboundedSender<Task<C, E>>,
    pub(crate) state_rx: watch::Receiver<StateId>,
    pub(crate) shutdown_tx: Arc<watch::Sender<Option<ShutdownMode>>>,
}

impl<C, E: Event> Clone for Handle<C, E> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            graph: Arc::clone(&self.graph),
            tasks: self.tasks.clone(),
            state_rx: self.state_rx.clone(),
            shutdown_tx: Arc::clone(&self.shutdown_tx),
        }
    }
}

impl<C, E> Handle<C, E>
where
    C: Send + 'static,
    E: Event,
{
    /// Enqueues an event. Errors it causes go to the machine's error policy.
    pub fn post(&self, event: E) -> Result<(), HsmError> {
        self.send(Task::Dispatch { event, reply: None })
    }

    /// Enqueues an event and waits for its dispatch to finish.
    ///
    /// Resolves to the handler's [`Handled::Reply`](crate::Handled::Reply) value, or `None`
    /// if it returned anything else. An error that escapes recovery is returned here and is
    /// not reported to the error policy.
    pub async fn call(&self, event: E) -> Result<Option<E::Reply>, HsmError> {
        let (tx, rx) = oneshot::channel();
        self.send(Task::Dispatch {
            event,
            reply: Some(tx),
        })?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Enqueues an event once `delay` has elapsed.
    pub fn deferred_post(&self, delay: Duration, event: E) -> Result<DeferredPost, HsmError> {
        if self.tasks.is_closed() {
            return Err(self.closed());
        }
        Ok(DeferredPost::schedule(self.tasks.downgrade(), delay, event))
    }

    /// Waits until every task enqueued before this call has completed.
    pub async fn sync(&self) -> Result<(), HsmError> {
        let (tx, rx) = oneshot::channel();
        self.send(Task::Barrier(tx))?;
        rx.await.map_err(|_| self.closed())
    }

    /// Queues an out-of-band replacement of state and context. No callbacks run.
    pub fn restore(&self, state: StateId, context: C) -> Result<(), HsmError> {
        self.send(Task::Restore { state, context })
    }

    /// Returns the last published state.
    pub fn current_state(&self) -> StateId {
        *self.state_rx.borrow()
    }

    pub fn current_state_name(&self) -> &str {
        self.graph.name(self.current_state())
    }

    /// Waits for the machine to reach the specified state.
    pub async fn wait_for_state(
        &self,
        target: StateId,
    ) -> Result<(), watch::error::RecvError> {
        let mut rx = self.state_rx.clone();
        while *rx.borrow_and_update() != target {
            rx.changed().await?;
        }
        Ok(())
    }

    /// Initiates a graceful shutdown. Processes queued tasks before exiting.
    pub fn shutdown_graceful(&self) {
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Graceful));
    }

    /// Initiates an immediate shutdown. Drops queued tasks.
    pub fn shutdown_immediate(&self) {
        let _ = self.shutdown_tx.send(Some(ShutdownMode::Immediate));
    }

    /// Whether the machine still accepts tasks.
    pub fn is_running(&self) -> bool {
        !self.tasks.is_closed()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Arc<StateGraph<C, E>> {
        &self.graph
    }

    fn send(&self, task: Task<C, E>) -> Result<(), HsmError> {
        self.tasks.send(task).map_err(|_| self.closed())
    }

    fn closed(&self) -> HsmError {
        HsmError::Closed(self.name.to_string())
    }
}

/// The machine's background task. Resolves to the context once the machine stops.
#[derive(Debug)]
pub struct MachineTask<C> {
    pub(crate) handle: JoinHandle<Result<C, HsmError>>,
}

impl<C> MachineTask<C> {
    /// Aborts the machine without waiting for the task in flight.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl<C> Future for MachineTask<C> {
    type Output = Result<C, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(Ok(context))) => Poll::Ready(Ok(context)),
            Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(TaskError::Machine(e))),
            Poll::Ready(Err(e)) => Poll::Ready(Err(TaskError::Join(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A pending deferred post.
#[derive(Debug)]
pub struct DeferredPost {
    timer: JoinHandle<()>,
}

impl DeferredPost {
    pub(crate) fn schedule<C, E>(
        tasks: mpsc::WeakUnboundedSender<Task<C, E>>,
        delay: Duration,
        event: E,
    ) -> Self
    where
        C: Send + 'static,
        E: Event,
    {
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tasks) = tasks.upgrade() {
                let _ = tasks.send(Task::Dispatch { event, reply: None });
            }
        });
        Self { timer }
    }

    /// Stops the timer. Has no effect once the event has been enqueued.
    pub fn cancel(&self) {
        self.timer.abort();
    }

    /// Whether the timer has fired or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.timer.is_finished()
    }
}
