//! Thread-safe queue that dispatches data to registered listeners.
//!
//! Grounded in `original_source/src/libs/CommonUtils/DataHandler.h`: a
//! producer pushes items, a dedicated worker thread pops them and invokes
//! every registered listener. Here the bounded FIFO is `ringbuf`'s heap ring
//! buffer (declared in the teacher's `Cargo.toml` but never wired up) using
//! `push_overwrite` to realize the overwrite-oldest policy from spec.md §5
//! without ever blocking the producer.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::error;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

type Listener<T> = Box<dyn Fn(&T) + Send>;

/// Bounded, single-producer/multi-listener publisher.
///
/// One producer (the engine's processing thread) pushes snapshots; `N`
/// listener callbacks registered via [`DataHandler::register_listener`] are
/// invoked serially on a single worker thread owned by the handler. When
/// the backing ring buffer is full, `signal_data` overwrites the oldest
/// queued item rather than blocking.
pub struct DataHandler<T: Send + 'static> {
    producer: Mutex<HeapProducer<T>>,
    listeners: Arc<Mutex<BTreeMap<u64, Listener<T>>>>,
    next_id: AtomicU64,
    wake: Arc<(Mutex<bool>, Condvar)>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> DataHandler<T> {
    /// Create a handler whose ring buffer holds at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = HeapRb::<T>::new(capacity.max(1)).split();
        let listeners: Arc<Mutex<BTreeMap<u64, Listener<T>>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let wake = Arc::new((Mutex::new(false), Condvar::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let listeners = listeners.clone();
            let wake = wake.clone();
            let stop = stop.clone();
            thread::spawn(move || Self::worker_loop(consumer, listeners, wake, stop))
        };

        Self {
            producer: Mutex::new(producer),
            listeners,
            next_id: AtomicU64::new(1),
            wake,
            stop,
            worker: Some(worker),
        }
    }

    fn worker_loop(
        mut consumer: HeapConsumer<T>,
        listeners: Arc<Mutex<BTreeMap<u64, Listener<T>>>>,
        wake: Arc<(Mutex<bool>, Condvar)>,
        stop: Arc<AtomicBool>,
    ) {
        let (lock, cvar) = &*wake;
        loop {
            {
                let mut signalled = lock.lock().unwrap();
                while !*signalled && !stop.load(Ordering::SeqCst) {
                    signalled = cvar.wait(signalled).unwrap();
                }
                *signalled = false;
            }
            while let Some(item) = consumer.pop() {
                Self::notify(&listeners, &item);
            }
            if stop.load(Ordering::SeqCst) && consumer.is_empty() {
                return;
            }
        }
    }

    fn notify(listeners: &Arc<Mutex<BTreeMap<u64, Listener<T>>>>, item: &T) {
        let listeners = listeners.lock().unwrap();
        for listener in listeners.values() {
            if catch_unwind(AssertUnwindSafe(|| listener(item))).is_err() {
                error!("data handler listener panicked; pipeline continues");
            }
        }
    }

    /// Push a new item, overwriting the oldest queued item if full. Never
    /// blocks the caller beyond the producer-side push itself.
    pub fn signal_data(&self, data: T) {
        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut producer = self.producer.lock().unwrap();
            producer.push_overwrite(data);
        }
        let (lock, cvar) = &*self.wake;
        *lock.lock().unwrap() = true;
        cvar.notify_one();
    }

    /// Register a listener, returning a stable id usable with
    /// [`DataHandler::unregister_listener`].
    pub fn register_listener<F>(&self, listener: F) -> u64
    where
        F: Fn(&T) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().insert(id, Box::new(listener));
        id
    }

    /// Unregister a listener by its registration id.
    pub fn unregister_listener(&self, id: u64) {
        self.listeners.lock().unwrap().remove(&id);
    }

    /// Current (listener count, queued item count) watermark.
    pub fn watermark_info(&self) -> (usize, usize) {
        let listeners = self.listeners.lock().unwrap().len();
        let queued = self.producer.lock().unwrap().len();
        (listeners, queued)
    }

    /// Remove every registered listener, e.g. on engine `stop()`.
    pub fn clear_listeners(&self) {
        self.listeners.lock().unwrap().clear();
    }
}

impl<T: Send + 'static> Drop for DataHandler<T> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let (lock, cvar) = &*self.wake;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.listeners.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn dispatches_to_registered_listeners() {
        let handler: DataHandler<i32> = DataHandler::new(4);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        handler.register_listener(move |v: &i32| {
            seen_clone.fetch_add(*v as usize, Ordering::SeqCst);
        });

        handler.signal_data(1);
        handler.signal_data(2);
        handler.signal_data(3);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn unregister_stops_dispatch() {
        let handler: DataHandler<i32> = DataHandler::new(4);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let id = handler.register_listener(move |v: &i32| {
            seen_clone.fetch_add(*v as usize, Ordering::SeqCst);
        });
        handler.unregister_listener(id);
        handler.signal_data(5);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn overwrite_oldest_never_blocks_producer() {
        let handler: DataHandler<i32> = DataHandler::new(2);
        for i in 0..100 {
            handler.signal_data(i);
        }
        // Completes promptly regardless of consumer speed: no panics/deadlock.
    }
}
