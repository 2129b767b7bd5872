//! # Typed Event Bus
//!
//! A synchronous, thread-safe, typed publish/subscribe event bus: an
//! in-process concurrency primitive, not a message broker.
//!
//! ## Overview
//!
//! Handlers are registered per event type with a [`Priority`] and invoked
//! synchronously on the dispatching thread, High before Normal before Low,
//! in registration order within a priority group. Per-type dispatchers are
//! indexed by `TypeId` and created lazily.
//!
//! ## Features
//!
//! * **Type-Safe**: Events are identified by their Rust type.
//! * **Priorities**: Three ordered priority groups, stable within a group.
//! * **One-shot handlers**: [`EventBus::subscribe_once`] runs exactly once,
//!   even under concurrent dispatch from multiple threads.
//! * **Reentrant**: A handler may subscribe, unsubscribe or dispatch from
//!   inside a dispatch pass; a handler subscribed mid-pass for the same bus
//!   and event type joins the in-flight pass.
//! * **RAII unsubscription**: [`ScopedConnection`] unsubscribes on drop.
//!
//! # Example
//!
//! ```rust
//! use typed_event_bus::{EventBus, EventBusError, Priority};
//!
//! #[derive(Debug)]
//! struct PlayerLogin {
//!     name: String,
//! }
//!
//! fn main() -> Result<(), EventBusError> {
//!     let bus = EventBus::new();
//!
//!     bus.subscribe(Priority::High, |login: &PlayerLogin| {
//!         println!("{} logged in", login.name);
//!         Ok(())
//!     })?;
//!
//!     bus.dispatch(PlayerLogin { name: "alice".into() })?;
//!     assert_eq!(bus.handler_count::<PlayerLogin>(), 1);
//!     Ok(())
//! }
//! ```

mod bus;
mod connection;
mod dispatcher;
mod error;
mod frame;

pub use bus::{Event, EventBus, HandlerId, Priority};
pub use connection::ScopedConnection;
pub use error::{BoxError, EventBusError};
