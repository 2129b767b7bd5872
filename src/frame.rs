use crate::bus::{Event, EventBus, HandlerId};
use crate::dispatcher::Dispatcher;
use crate::error::EventBusError;
use std::any::TypeId;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

thread_local! {
    /// Stack of in-flight dispatch calls on this thread, innermost last.
    /// One stack per thread, shared by every bus used on that thread.
    static DISPATCH_STACK: RefCell<Vec<Rc<dyn ActiveFrame>>> = RefCell::new(Vec::new());
}

/// One in-flight `dispatch` call, with a single capability: deliver the
/// frame's live event to one named handler.
pub(crate) trait ActiveFrame {
    fn is_frame_for(&self, bus: &EventBus, event_type: TypeId) -> bool;

    fn deliver(&self, id: HandlerId) -> Result<(), EventBusError>;
}

pub(crate) struct DispatchFrame<E> {
    bus: EventBus,
    dispatcher: Arc<Dispatcher<E>>,
    event: Arc<E>,
}

impl<E: Event> DispatchFrame<E> {
    pub(crate) fn new(bus: EventBus, dispatcher: Arc<Dispatcher<E>>, event: Arc<E>) -> Rc<Self> {
        Rc::new(Self { bus, dispatcher, event })
    }
}

impl<E: Event> ActiveFrame for DispatchFrame<E> {
    fn is_frame_for(&self, bus: &EventBus, event_type: TypeId) -> bool {
        self.bus.same_bus(bus) && event_type == TypeId::of::<E>()
    }

    fn deliver(&self, id: HandlerId) -> Result<(), EventBusError> {
        self.dispatcher.invoke_single(id, &self.event)
    }
}

/// RAII pairing of push/pop around one dispatch call. The pop happens on drop,
/// so the frame never outlives its `dispatch` even when a handler panics.
pub(crate) struct FrameGuard {
    _private: (),
}

impl FrameGuard {
    pub(crate) fn push(frame: Rc<dyn ActiveFrame>) -> Self {
        DISPATCH_STACK.with_borrow_mut(|stack| stack.push(frame));
        Self { _private: () }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        DISPATCH_STACK.with_borrow_mut(|stack| {
            stack.pop();
        });
    }
}

/// Innermost frame on this thread matching the given bus and event type.
///
/// The frame is cloned out of the stack before use, so delivery runs without
/// the thread-local borrow held and the handler may re-enter the bus freely.
pub(crate) fn innermost_matching(
    bus: &EventBus,
    event_type: TypeId,
) -> Option<Rc<dyn ActiveFrame>> {
    DISPATCH_STACK
        .with_borrow(|stack| stack.iter().rev().find(|frame| frame.is_frame_for(bus, event_type)).cloned())
}
