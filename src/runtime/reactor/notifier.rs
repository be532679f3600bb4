//! Cross-thread handoff into the event loop.
//!
//! Producer threads (for example a console reader) push items onto a
//! mutex-guarded queue and wake the poller. The loop thread drains the queue
//! to empty, under the same mutex, every time the waker fires. Wakeups can be
//! spurious: the queue may already be empty when the loop looks at it.

use crate::runtime::token::WAKER_TOKEN;
use mio::{Registry, Waker};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    waker: Waker,
    stop: AtomicBool,
}

/// Thread-safe handle for feeding work to an event loop.
pub struct Notifier<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Notifier<T> {
    /// Create a notifier whose waker is registered with `registry`.
    pub(crate) fn new(registry: &Registry) -> io::Result<Self> {
        Ok(Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                waker: Waker::new(registry, WAKER_TOKEN)?,
                stop: AtomicBool::new(false),
            }),
        })
    }

    /// Hand `item` to the loop and interrupt its wait.
    pub fn send(&self, item: T) -> io::Result<()> {
        let mut queue = self
            .shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.push_back(item);
        self.shared.waker.wake()
    }

    /// Ask the loop to close every connection and return from `run`.
    pub fn shutdown(&self) -> io::Result<()> {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.waker.wake()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// Take every queued item. Called on the loop thread.
    pub(crate) fn drain(&self) -> Vec<T> {
        let mut queue = self
            .shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_send_wakes_poll() {
        let mut poll = Poll::new().unwrap();
        let notifier = Notifier::new(poll.registry()).unwrap();

        let producer = notifier.clone();
        let handle = thread::spawn(move || {
            producer.send("hello").unwrap();
            producer.send("world").unwrap();
        });
        handle.join().unwrap();

        let mut events = Events::with_capacity(8);
        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().any(|e| e.token() == WAKER_TOKEN));

        assert_eq!(notifier.drain(), vec!["hello", "world"]);
        // A second drain after a spurious wake finds nothing
        assert!(notifier.drain().is_empty());
    }

    #[test]
    fn test_shutdown_flag() {
        let poll = Poll::new().unwrap();
        let notifier: Notifier<()> = Notifier::new(poll.registry()).unwrap();
        assert!(!notifier.is_shutdown());
        notifier.clone().shutdown().unwrap();
        assert!(notifier.is_shutdown());
    }
}
