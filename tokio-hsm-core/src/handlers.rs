//! Handler type aliases for state callbacks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{BoxError, EventHandlerError, UnhandledEventError};
use crate::event::{Event, Handled};
use crate::instance::Instance;

/// A boxed future that is Send
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type returned by every user callback
pub type HandlerResult<T> = Result<T, BoxError>;

/// Async event handler
///
/// Invoked with the machine instance and the event. Returns a [`Handled`] outcome, or an
/// error which the engine routes into unhandled or error recovery.
pub type EventHandler<C, E> = Arc<
    dyn for<'a> Fn(
            &'a mut Instance<C, E>,
            &'a E,
        ) -> BoxFuture<'a, HandlerResult<Handled<<E as Event>::Reply>>>
        + Send
        + Sync,
>;

/// Async lifecycle callback (`on_entry` / `on_exit`)
pub type LifecycleHook<C, E> =
    Arc<dyn for<'a> Fn(&'a mut Instance<C, E>) -> BoxFuture<'a, HandlerResult<()>> + Send + Sync>;

/// Async `on_error` callback
pub type ErrorHook<C, E> = Arc<
    dyn for<'a> Fn(&'a mut Instance<C, E>, &'a EventHandlerError) -> BoxFuture<'a, HandlerResult<()>>
        + Send
        + Sync,
>;

/// Async `on_unhandled` callback
pub type UnhandledHook<C, E> = Arc<
    dyn for<'a> Fn(
            &'a mut Instance<C, E>,
            &'a UnhandledEventError,
        ) -> BoxFuture<'a, HandlerResult<()>>
        + Send
        + Sync,
>;
