use crate::bus::{EventBus, HandlerId};

/// RAII handle that unsubscribes its handler when dropped.
///
/// The connection is the single owner of the pending-unsubscribe obligation:
/// it is movable but not clonable, so the handler is unsubscribed exactly once.
/// A default-constructed connection is empty and a no-op on drop.
///
/// # Examples
/// ```rust
/// use typed_event_bus::{EventBus, Priority, ScopedConnection};
///
/// #[derive(Debug)]
/// struct Tick(u64);
///
/// # fn main() -> Result<(), typed_event_bus::EventBusError> {
/// let bus = EventBus::new();
/// {
///     let id = bus.subscribe(Priority::Normal, |_: &Tick| Ok(()))?;
///     let _connection = ScopedConnection::new(&bus, id);
///     assert_eq!(bus.handler_count::<Tick>(), 1);
/// }
/// assert_eq!(bus.handler_count::<Tick>(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
#[must_use = "dropping a ScopedConnection immediately unsubscribes its handler"]
pub struct ScopedConnection {
    binding: Option<(EventBus, HandlerId)>,
}

impl ScopedConnection {
    /// Binds a handler id to the bus it was registered on.
    pub fn new(bus: &EventBus, id: HandlerId) -> Self {
        Self { binding: Some((bus.clone(), id)) }
    }

    /// Unsubscribes the bound handler and empties the connection.
    /// Repeated calls are no-ops.
    pub fn disconnect(&mut self) {
        if let Some((bus, id)) = self.binding.take() {
            bus.unsubscribe(id);
        }
    }

    /// Bound handler id, or `0` if the connection is empty.
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.binding.as_ref().map_or(0, |(_, id)| *id)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.binding.is_some()
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
