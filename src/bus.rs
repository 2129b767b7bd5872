use crate::dispatcher::{Callback, Dispatcher, ErasedDispatcher};
use crate::error::{BoxError, EventBusError};
use crate::frame::{DispatchFrame, FrameGuard, innermost_matching};
use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock};
use std::any::{TypeId, type_name};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Opaque handler identifier.
///
/// Ids are allocated per bus, start at 1, increase monotonically and are never
/// reused. `0` is reserved as the "no handler" sentinel.
pub type HandlerId = u64;

/// Execution priority of a handler.
///
/// Within one dispatch pass all [`Priority::High`] handlers run before any
/// [`Priority::Normal`] handler, and all `Normal` before any [`Priority::Low`].
/// The derived ordering follows declaration order, so a stable ascending sort
/// of slots yields the dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Normal,
    Low,
}

/// Marker trait for types that can be dispatched through the [`EventBus`].
///
/// Any type that is `Send + Sync + 'static` automatically implements this trait.
pub trait Event: std::any::Any + Send + Sync + 'static {}
impl<T: std::any::Any + Send + Sync + 'static> Event for T {}

/// A synchronous, thread-safe, typed publish/subscribe event bus.
///
/// Handlers are registered per event type with a [`Priority`] and invoked on
/// the dispatching thread. Dispatchers are indexed by [`TypeId`] and created
/// lazily on first use.
///
/// `EventBus` is cheap to clone; clones share the same registry and are the
/// same bus for all identity purposes (reentrancy, [`ScopedConnection`]).
///
/// [`ScopedConnection`]: crate::ScopedConnection
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    dispatchers: RwLock<FxHashMap<TypeId, Arc<dyn ErasedDispatcher>>>,
    handler_types: Mutex<FxHashMap<HandlerId, TypeId>>,
    next_id: AtomicU64,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            dispatchers: RwLock::default(),
            handler_types: Mutex::default(),
            // Id 0 is the sentinel, allocation starts at 1.
            next_id: AtomicU64::new(1),
        }
    }
}

impl EventBus {
    /// Creates a new, empty `EventBus`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for events of type `E`.
    ///
    /// If this call happens inside a handler that is itself running in a
    /// dispatch for `E` on this bus and thread, the new handler is invoked
    /// once on the in-flight event before `subscribe` returns.
    ///
    /// # Errors
    /// Returns [`EventBusError::Handler`] if the immediate in-flight delivery
    /// fails, or [`EventBusError::TypeMismatch`] on a registry invariant
    /// violation (never observed in correct use).
    ///
    /// # Examples
    /// ```rust
    /// use typed_event_bus::{EventBus, Priority};
    ///
    /// #[derive(Debug)]
    /// struct UserCreated {
    ///     id: u64,
    /// }
    ///
    /// # fn main() -> Result<(), typed_event_bus::EventBusError> {
    /// let bus = EventBus::new();
    /// let id = bus.subscribe(Priority::Normal, |event: &UserCreated| {
    ///     assert_eq!(event.id, 42);
    ///     Ok(())
    /// })?;
    /// bus.dispatch(UserCreated { id: 42 })?;
    /// bus.unsubscribe(id);
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe<E, F>(&self, priority: Priority, handler: F) -> Result<HandlerId, EventBusError>
    where
        E: Event,
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe_impl(priority, Box::new(handler), false)
    }

    /// Registers a handler that runs at most once, then removes itself.
    ///
    /// The at-most-once guarantee holds under concurrent dispatch calls from
    /// multiple threads: exactly one of them invokes the handler.
    ///
    /// # Errors
    /// Same conditions as [`EventBus::subscribe`].
    ///
    /// # Examples
    /// ```rust
    /// use typed_event_bus::{EventBus, Priority};
    ///
    /// #[derive(Debug)]
    /// struct Tick(u64);
    ///
    /// # fn main() -> Result<(), typed_event_bus::EventBusError> {
    /// let bus = EventBus::new();
    /// bus.subscribe_once(Priority::Normal, |_: &Tick| Ok(()))?;
    /// bus.dispatch(Tick(1))?;
    /// assert_eq!(bus.handler_count::<Tick>(), 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe_once<E, F>(
        &self,
        priority: Priority,
        handler: F,
    ) -> Result<HandlerId, EventBusError>
    where
        E: Event,
        F: Fn(&E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe_impl(priority, Box::new(handler), true)
    }

    fn subscribe_impl<E: Event>(
        &self,
        priority: Priority,
        callback: Callback<E>,
        one_shot: bool,
    ) -> Result<HandlerId, EventBusError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let dispatcher = self.dispatcher_of::<E>()?;
        dispatcher.insert(id, priority, callback, one_shot);
        self.shared.handler_types.lock().insert(id, TypeId::of::<E>());

        trace!(event = type_name::<E>(), id, ?priority, one_shot, "handler subscribed");

        self.notify_current_dispatch::<E>(id)?;
        Ok(id)
    }

    /// Removes a handler by id, whatever its event type.
    ///
    /// Unknown ids and repeated calls are silently tolerated.
    pub fn unsubscribe(&self, id: HandlerId) {
        let type_id = self.shared.handler_types.lock().remove(&id);
        let Some(type_id) = type_id else {
            trace!(id, "unsubscribe ignored, unknown handler id");
            return;
        };

        let dispatcher = self.shared.dispatchers.read().get(&type_id).cloned();
        if let Some(dispatcher) = dispatcher {
            let removed = dispatcher.remove(id);
            trace!(id, removed, "handler unsubscribed");
        }
    }

    /// Dispatches `event` synchronously to every handler registered for `E`,
    /// in priority order. Dispatching with zero handlers is a legal no-op.
    ///
    /// Callbacks run on the calling thread with no bus lock held, so a handler
    /// may subscribe, unsubscribe or dispatch reentrantly without deadlocking.
    ///
    /// # Errors
    /// Returns [`EventBusError::Handler`] with the first failing handler's
    /// error; handlers scheduled after it in the same pass are skipped. The
    /// bus stays fully usable afterwards.
    ///
    /// # Examples
    /// ```rust
    /// use typed_event_bus::{EventBus, Priority};
    ///
    /// #[derive(Debug)]
    /// struct KeyPress {
    ///     code: u32,
    /// }
    ///
    /// # fn main() -> Result<(), typed_event_bus::EventBusError> {
    /// let bus = EventBus::new();
    /// bus.subscribe(Priority::High, |key: &KeyPress| {
    ///     println!("pressed {}", key.code);
    ///     Ok(())
    /// })?;
    /// bus.dispatch(KeyPress { code: 32 })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn dispatch<E: Event>(&self, event: E) -> Result<(), EventBusError> {
        let dispatcher = self.dispatcher_of::<E>()?;
        let event = Arc::new(event);

        trace!(event = type_name::<E>(), "dispatching");

        let frame = DispatchFrame::new(self.clone(), Arc::clone(&dispatcher), Arc::clone(&event));
        let _guard = FrameGuard::push(frame);

        dispatcher.dispatch(&event)
    }

    /// Number of active handlers registered for `E`.
    ///
    /// Not linearizable with concurrent mutation; a momentary race with a
    /// handler mid-removal is acceptable.
    #[must_use]
    pub fn handler_count<E: Event>(&self) -> usize {
        self.shared
            .dispatchers
            .read()
            .get(&TypeId::of::<E>())
            .map_or(0, |dispatcher| dispatcher.count())
    }

    pub(crate) fn same_bus(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Looks up or lazily creates the dispatcher for `E`.
    ///
    /// The registry entry and the concrete dispatcher type are established
    /// together at first use, so the downcast only fails if that invariant is
    /// broken.
    fn dispatcher_of<E: Event>(&self) -> Result<Arc<Dispatcher<E>>, EventBusError> {
        let type_id = TypeId::of::<E>();

        let existing = self.shared.dispatchers.read().get(&type_id).cloned();
        let erased = match existing {
            Some(erased) => erased,
            None => {
                let mut dispatchers = self.shared.dispatchers.write();
                Arc::clone(dispatchers.entry(type_id).or_insert_with(|| {
                    debug!(event = type_name::<E>(), "creating dispatcher");
                    Arc::new(Dispatcher::<E>::new()) as Arc<dyn ErasedDispatcher>
                }))
            },
        };

        erased.as_any_arc().downcast::<Dispatcher<E>>().map_err(|_| {
            EventBusError::TypeMismatch {
                message: type_name::<E>().into(),
                context: Some("registry entry does not match the event type".into()),
            }
        })
    }

    /// If a dispatch for `E` on this bus is in flight on the current thread,
    /// delivers its live event to the freshly subscribed handler.
    ///
    /// The stack is searched innermost-first: the most recently started
    /// matching dispatch is the only one guaranteed not to have visited the
    /// new handler yet.
    fn notify_current_dispatch<E: Event>(&self, id: HandlerId) -> Result<(), EventBusError> {
        let Some(frame) = innermost_matching(self, TypeId::of::<E>()) else {
            return Ok(());
        };
        trace!(event = type_name::<E>(), id, "delivering in-flight event to new handler");
        frame.deliver(id)
    }
}
