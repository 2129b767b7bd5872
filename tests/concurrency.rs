
#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use typed_event_bus::*;

    const THREADS: usize = 8;

    #[test]
    fn test_one_shot_fires_exactly_once_under_concurrent_dispatch() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        bus.subscribe_once(Priority::Normal, move |_: &Tick| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let bus = bus.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    bus.dispatch(Tick(0)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(bus.handler_count::<Tick>(), 0);
    }

    #[test]
    fn test_concurrent_dispatch_reaches_handler_every_time() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        bus.subscribe(Priority::Normal, move |_: &Tick| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let bus = bus.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    bus.dispatch(Tick(0)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::Relaxed), THREADS as u32);
    }

    #[test]
    fn test_concurrent_subscribe_unsubscribe_and_dispatch() {
        const WORKERS: usize = 4;
        const ITERATIONS: usize = 2000;

        let bus = EventBus::new();
        let stop = Arc::new(AtomicBool::new(false));

        let dispatcher = {
            let bus = bus.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    bus.dispatch(Tick(0)).unwrap();
                }
            })
        };

        let barrier = Arc::new(Barrier::new(WORKERS));
        let workers: Vec<_> = (0..WORKERS)
            .map(|_| {
                let bus = bus.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..ITERATIONS {
                        let id = bus.subscribe(Priority::Normal, |_: &Tick| Ok(())).unwrap();
                        bus.unsubscribe(id);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        stop.store(true, Ordering::Relaxed);
        dispatcher.join().unwrap();

        assert_eq!(bus.handler_count::<Tick>(), 0);
    }

    #[test]
    fn test_one_shot_subscribed_from_many_threads_all_fire() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicU32::new(0));

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let bus = bus.clone();
                let barrier = Arc::clone(&barrier);
                let counter = Arc::clone(&calls);
                thread::spawn(move || {
                    barrier.wait();
                    let counter = Arc::clone(&counter);
                    bus.subscribe_once(Priority::Low, move |_: &Tick| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    })
                    .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(bus.handler_count::<Tick>(), THREADS);
        bus.dispatch(Tick(0)).unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), THREADS as u32);
        assert_eq!(bus.handler_count::<Tick>(), 0);
    }

    fn priority_strategy() -> impl Strategy<Value = Priority> {
        prop_oneof![Just(Priority::High), Just(Priority::Normal), Just(Priority::Low)]
    }

    proptest! {
        /// For any interleaving of registrations, one dispatch invokes the
        /// handlers grouped High before Normal before Low, registration order
        /// preserved within each group.
        #[test]
        fn dispatch_preserves_priority_group_order(
            priorities in proptest::collection::vec(priority_strategy(), 0..12)
        ) {
            let bus = EventBus::new();
            let order = Arc::new(Mutex::new(Vec::new()));

            for (index, priority) in priorities.iter().copied().enumerate() {
                let order = Arc::clone(&order);
                bus.subscribe(priority, move |_: &Tick| {
                    order.lock().push(index);
                    Ok(())
                })
                .unwrap();
            }

            bus.dispatch(Tick(0)).unwrap();

            let mut expected: Vec<usize> = (0..priorities.len()).collect();
            expected.sort_by_key(|&index| priorities[index]);
            prop_assert_eq!(order.lock().clone(), expected);
        }
    }
}
