use crate::bus::{Event, HandlerId, Priority};
use crate::error::{BoxError, EventBusError};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) type Callback<E> = Box<dyn Fn(&E) -> Result<(), BoxError> + Send + Sync>;

/// One registered handler's record.
///
/// `active` transitions `true -> false` exactly once and never back. A slot
/// with `active == false` is logically dead but may remain in the sequence
/// until the next purge.
struct Slot<E> {
    id: HandlerId,
    priority: Priority,
    callback: Callback<E>,
    one_shot: bool,
    active: AtomicBool,
}

/// Owns every slot registered for one event type.
///
/// The slot sequence is kept sorted by priority (stable within a priority
/// group, so registration order is preserved). Dispatch copies the sequence
/// under the read lock and invokes callbacks with no lock held, so a callback
/// is free to re-enter the bus.
pub(crate) struct Dispatcher<E> {
    slots: RwLock<Vec<Arc<Slot<E>>>>,
}

impl<E: Event> Dispatcher<E> {
    pub(crate) fn new() -> Self {
        Self { slots: RwLock::new(Vec::new()) }
    }

    pub(crate) fn insert(
        &self,
        id: HandlerId,
        priority: Priority,
        callback: Callback<E>,
        one_shot: bool,
    ) {
        let slot =
            Arc::new(Slot { id, priority, callback, one_shot, active: AtomicBool::new(true) });

        let mut slots = self.slots.write();
        slots.push(slot);
        // Stable sort: equal priorities keep their insertion order.
        slots.sort_by_key(|slot| slot.priority);
    }

    /// Invokes every active slot, in sequence order, against `event`.
    ///
    /// One-shot consumption is a CAS on `active`: under concurrent dispatch
    /// calls the winner of the CAS is the only caller that runs the handler.
    /// On a handler failure the remaining slots are skipped, consumed one-shot
    /// slots are purged, and the error is returned to the caller.
    pub(crate) fn dispatch(&self, event: &E) -> Result<(), EventBusError> {
        let snapshot: Vec<Arc<Slot<E>>> = self.slots.read().clone();

        let mut consumed = false;
        for slot in &snapshot {
            if slot.one_shot {
                if slot
                    .active
                    .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Another dispatch already claimed this one-shot slot.
                    continue;
                }
                consumed = true;
            } else if !slot.active.load(Ordering::Acquire) {
                continue;
            }

            if let Err(source) = (slot.callback)(event) {
                if consumed {
                    self.purge();
                }
                return Err(EventBusError::handler::<E>(source));
            }
        }

        if consumed {
            self.purge();
        }
        Ok(())
    }

    /// Invokes exactly one slot once, applying the same one-shot CAS and
    /// active-check rules as a single `dispatch` iteration.
    ///
    /// A no-op if `id` is unknown to this dispatcher or already inactive.
    pub(crate) fn invoke_single(&self, id: HandlerId, event: &E) -> Result<(), EventBusError> {
        let slot = self.slots.read().iter().find(|slot| slot.id == id).cloned();
        let Some(slot) = slot else {
            return Ok(());
        };

        let consumed = if slot.one_shot {
            if slot
                .active
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Ok(());
            }
            true
        } else {
            if !slot.active.load(Ordering::Acquire) {
                return Ok(());
            }
            false
        };

        let result = (slot.callback)(event);
        if consumed {
            self.purge();
        }
        result.map_err(|source| EventBusError::handler::<E>(source))
    }

    fn purge(&self) {
        let mut slots = self.slots.write();
        Self::purge_locked(&mut slots);
    }

    fn purge_locked(slots: &mut Vec<Arc<Slot<E>>>) {
        slots.retain(|slot| slot.active.load(Ordering::Relaxed));
    }
}

impl<E> fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// Type-erased view of a [`Dispatcher`], stored in the bus registry.
///
/// Exposes only the operations that do not need the event type; the concrete
/// dispatcher is recovered with a checked downcast through [`Self::as_any_arc`].
pub(crate) trait ErasedDispatcher: fmt::Debug + Send + Sync {
    /// Logically removes a slot. Returns `true` if the id was present.
    fn remove(&self, id: HandlerId) -> bool;

    /// Number of active slots.
    fn count(&self) -> usize;

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Event> ErasedDispatcher for Dispatcher<E> {
    fn remove(&self, id: HandlerId) -> bool {
        let mut slots = self.slots.write();
        let Some(slot) = slots.iter().find(|slot| slot.id == id) else {
            return false;
        };
        slot.active.store(false, Ordering::Release);
        Self::purge_locked(&mut slots);
        true
    }

    fn count(&self) -> usize {
        self.slots.read().iter().filter(|slot| slot.active.load(Ordering::Relaxed)).count()
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
