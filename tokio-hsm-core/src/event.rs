//! Event protocol shared by every state of a machine.

use std::fmt::Debug;

use crate::graph::StateId;

/// A closed set of events a machine understands.
///
/// Each variant has a protocol name; handlers are registered against these names and looked
/// up by them at dispatch time. Usually derived with `#[derive(Event)]`.
///
/// ```rust
/// # use tokio_hsm_core::Event;
/// #[derive(Debug)]
/// enum Player {
///     Play,
///     Seek(u32),
/// }
///
/// impl Event for Player {
///     type Reply = ();
///
///     fn name(&self) -> &'static str {
///         match self {
///             Player::Play => "Play",
///             Player::Seek(_) => "Seek",
///         }
///     }
///
///     fn names() -> &'static [&'static str] {
///         &["Play", "Seek"]
///     }
/// }
///
/// assert_eq!(Player::Seek(3).name(), "Seek");
/// ```
pub trait Event: Debug + Send + Sync + 'static {
    /// Value a handler can hand back to a `call`er.
    type Reply: Send + 'static;

    /// Protocol name of this event.
    fn name(&self) -> &'static str;

    /// Every protocol name this type can produce.
    fn names() -> &'static [&'static str];
}

/// Outcome of a successful event handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled<R> {
    /// Handled; stay in the current state.
    Stay,
    /// Handled; transition to the given state once the handler returns.
    Transition(StateId),
    /// Handled; deliver the value to the `call` awaiting this dispatch.
    Reply(R),
}

impl<R> Handled<R> {
    /// Consumes the outcome, returning the reply if there was one.
    pub fn into_reply(self) -> Option<R> {
        match self {
            Handled::Reply(reply) => Some(reply),
            _ => None,
        }
    }
}
