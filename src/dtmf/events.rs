//! Event delivery from audio threads to any number of listeners
//!
//! Producers (the recognizer callback, session threads) hold an `EventSink`
//! and only ever perform a non-blocking unbounded send. A dispatcher thread
//! fans each event out to every subscriber, so consumer logic never runs on
//! an audio thread.

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Producer handle for an `EventBus`
pub struct EventSink<T> {
    tx: Sender<T>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSink<T> {
    /// Hand an event to the dispatcher. Never blocks.
    pub fn publish(&self, event: T) {
        // Only fails once the dispatcher is gone, i.e. nobody can listen anymore
        let _ = self.tx.send(event);
    }
}

/// Fan-out event channel
pub struct EventBus<T> {
    sink: EventSink<T>,
    subscribers: Arc<Mutex<Vec<Sender<T>>>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded::<T>();
        let subscribers: Arc<Mutex<Vec<Sender<T>>>> = Arc::new(Mutex::new(Vec::new()));

        let dispatch_to = subscribers.clone();
        thread::spawn(move || {
            // Runs until the bus and every sink are dropped
            for event in rx.iter() {
                let mut subs = match dispatch_to.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                subs.retain(|sub| sub.send(event.clone()).is_ok());
            }
        });

        Self {
            sink: EventSink { tx },
            subscribers,
        }
    }

    /// Producer handle to pass into a synthesizer or recognizer
    pub fn sink(&self) -> EventSink<T> {
        self.sink.clone()
    }

    /// Register a new listener. It receives every event published from now on.
    /// Dropping the receiver unregisters it.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        match self.subscribers.lock() {
            Ok(mut subs) => subs.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    pub fn publish(&self, event: T) {
        self.sink.publish(event);
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
