//! Fan-out of job events to subscribers with per-subscriber bounded buffers.
//!
//! Publishing never waits on a subscriber. When a subscriber's buffer is full
//! the oldest non-terminal event is evicted; terminal events are always kept,
//! so a slow observer still learns how every job ended.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::Notify;

use super::JobEvent;

/// Buffer size used when a caller does not pick one.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct SubscriberQueue {
    capacity: usize,
    buf: Mutex<VecDeque<JobEvent>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<JobEvent>> {
        // A panic while holding the buffer leaves it structurally intact.
        self.buf.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, event: JobEvent) {
        {
            let mut buf = self.lock();
            if buf.len() >= self.capacity {
                if let Some(pos) = buf.iter().position(|e| !e.is_terminal()) {
                    buf.remove(pos);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            buf.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

#[derive(Default)]
struct PublisherInner {
    subscribers: Mutex<Vec<Weak<SubscriberQueue>>>,
}

impl Drop for PublisherInner {
    fn drop(&mut self) {
        let subs = self
            .subscribers
            .get_mut()
            .map(std::mem::take)
            .unwrap_or_default();
        for queue in subs.iter().filter_map(Weak::upgrade) {
            queue.close();
        }
    }
}

/// Subscriber list. Cheap to clone; all clones share the same subscribers.
#[derive(Clone, Default)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber with a buffer of `capacity` events.
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let queue = Arc::new(SubscriberQueue {
            capacity: capacity.max(1),
            buf: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        self.subscribers().push(Arc::downgrade(&queue));
        Subscription { queue }
    }

    /// Register a handler called for every event on a dedicated task.
    /// Must be called from within a Tokio runtime.
    pub fn subscribe_with<F>(&self, capacity: usize, mut handler: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(JobEvent) + Send + 'static,
    {
        let sub = self.subscribe(capacity);
        tokio::spawn(async move {
            while let Some(event) = sub.recv().await {
                handler(event);
            }
        })
    }

    /// Deliver `event` to every live subscriber. Never blocks on a consumer.
    pub fn publish(&self, event: JobEvent) {
        let mut subs = self.subscribers();
        subs.retain(|weak| match weak.upgrade() {
            Some(queue) => {
                queue.push(event.clone());
                true
            }
            None => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers();
        subs.retain(|w| w.strong_count() > 0);
        subs.len()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Weak<SubscriberQueue>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Receiving end of a subscription. Dropping it unregisters the subscriber.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Next event, waiting if none is buffered. Returns `None` once every
    /// publisher handle is gone and the buffer is drained.
    pub async fn recv(&self) -> Option<JobEvent> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return self.try_recv();
            }
            self.queue.notify.notified().await;
        }
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&self) -> Option<JobEvent> {
        self.queue.lock().pop_front()
    }

    /// Number of events evicted from this subscriber's buffer so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
