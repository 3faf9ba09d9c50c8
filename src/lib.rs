//! # tokio-hsm
//!
//! Hierarchical state machines on Tokio. States form a tree: an event not handled by the
//! current state is offered to its parent, then to the parent's parent, up to the top state.
//! Every machine runs on its own task and handles one event at a time, so async handlers
//! never overlap.
//!
//! ## Example
//!
//! ```rust
//! use tokio_hsm::{Event, Handled, MachineFactory, StateGraphBuilder};
//!
//! #[derive(Debug, Event)]
//! #[event(reply = "u32")]
//! enum Door {
//!     Open,
//!     Close,
//!     Count,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = StateGraphBuilder::<u32, Door>::new("Door");
//! let top = builder.top();
//! let closed = builder.state("Closed", top)?;
//! let opened = builder.state("Opened", top)?;
//! builder.initial(top, closed)?;
//!
//! builder
//!     .on(closed, "Open", move |_m, _e| Box::pin(async move { Ok(Handled::Transition(opened)) }))?
//!     .on(opened, "Close", move |_m, _e| Box::pin(async move { Ok(Handled::Transition(closed)) }))?
//!     .on(top, "Count", |m, _e| Box::pin(async move { Ok(Handled::Reply(*m.context())) }))?
//!     .on_entry(opened, |m| {
//!         Box::pin(async move {
//!             *m.context_mut() += 1;
//!             Ok(())
//!         })
//!     })?;
//!
//! let (handle, task) = MachineFactory::new(builder.build()).create(0);
//! handle.post(Door::Open)?;
//! handle.post(Door::Close)?;
//! handle.post(Door::Open)?;
//! assert_eq!(handle.call(Door::Count).await?, Some(2));
//! assert_eq!(handle.current_state(), opened);
//!
//! handle.shutdown_graceful();
//! assert_eq!(task.await?, 2);
//! # Ok(())
//! # }
//! ```

#[doc(inline)]
pub use tokio_hsm_core::*;
#[doc(inline)]
pub use tokio_hsm_macros::Event;
