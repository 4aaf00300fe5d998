use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Errors surfaced by queue operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue was closed before or during the operation.
    #[error("queue is closed")]
    Closed,
    /// `close` was called on a queue that is already closed.
    #[error("queue already closed")]
    AlreadyClosed,
}

/// Rejections from [`QueueSender::try_push`], carrying the item back.
#[derive(Debug, thiserror::Error)]
pub enum TryPushError<T> {
    /// The queue is at capacity.
    #[error("queue is full")]
    Full(T),
    /// The queue is closed.
    #[error("queue is closed")]
    Closed(T),
}

impl<T> TryPushError<T> {
    /// Recovers the item that was not enqueued.
    pub fn into_inner(self) -> T {
        match self {
            TryPushError::Full(item) | TryPushError::Closed(item) => item,
        }
    }
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    /// Total items ever taken; rendezvous pushes use this to learn that
    /// their item was handed off.
    pops: u64,
}

struct Shared<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> Shared<T> {
    fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Creates a bounded FIFO queue and returns its two halves.
///
/// `capacity` is the number of items the queue buffers; `0` builds a
/// rendezvous queue where every push waits for a matching pop.
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let shared = Arc::new(Shared {
        capacity,
        state: Mutex::new(State {
            items: VecDeque::with_capacity(capacity.max(1)),
            closed: false,
            pops: 0,
        }),
        not_empty: Notify::new(),
        not_full: Notify::new(),
    });
    (
        QueueSender {
            shared: shared.clone(),
        },
        QueueReceiver { shared },
    )
}

/// Producer half of a bounded queue.
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer half of a bounded queue.
pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueues `item`, waiting while the queue is full.
    ///
    /// On a rendezvous queue (capacity zero) this completes only once a
    /// consumer has taken the item. Returns [`QueueError::Closed`] if the
    /// queue closes before the item is accepted; in that case the item is
    /// dropped.
    pub async fn push(&self, item: T) -> Result<(), QueueError> {
        if self.shared.capacity == 0 {
            return self.push_rendezvous(item).await;
        }
        loop {
            let notified = self.shared.not_full.notified();
            tokio::pin!(notified);
            // Register for wakeups before checking state so a pop between
            // the check and the await cannot be missed.
            notified.as_mut().enable();
            {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return Err(QueueError::Closed);
                }
                if state.items.len() < self.shared.capacity {
                    state.items.push_back(item);
                    drop(state);
                    self.shared.not_empty.notify_waiters();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    async fn push_rendezvous(&self, item: T) -> Result<(), QueueError> {
        // Phase one: claim the single hand-off slot.
        let handed_off_after;
        loop {
            let notified = self.shared.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return Err(QueueError::Closed);
                }
                if state.items.is_empty() {
                    state.items.push_back(item);
                    handed_off_after = state.pops;
                    drop(state);
                    self.shared.not_empty.notify_waiters();
                    break;
                }
            }
            notified.await;
        }
        // Phase two: wait until a consumer takes it.
        loop {
            let notified = self.shared.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.shared.state.lock();
                if state.pops > handed_off_after {
                    return Ok(());
                }
                if state.closed {
                    // Nobody took it; withdraw the item so close() ends the
                    // stream instead of leaking a final element.
                    state.items.pop_front();
                    return Err(QueueError::Closed);
                }
            }
            notified.await;
        }
    }

    /// Enqueues `item` without waiting.
    ///
    /// Rendezvous queues always report [`TryPushError::Full`]: a hand-off
    /// cannot complete without waiting for the consumer.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(TryPushError::Closed(item));
        }
        if state.items.len() >= self.shared.capacity {
            return Err(TryPushError::Full(item));
        }
        state.items.push_back(item);
        drop(state);
        self.shared.not_empty.notify_waiters();
        Ok(())
    }

    /// Closes the queue.
    ///
    /// Producers blocked in [`push`](Self::push) fail with
    /// [`QueueError::Closed`]; consumers drain the remaining items and then
    /// see the stream end. Calling `close` a second time is a contract
    /// violation and returns [`QueueError::AlreadyClosed`].
    pub fn close(&self) -> Result<(), QueueError> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(QueueError::AlreadyClosed);
            }
            state.closed = true;
        }
        self.shared.not_empty.notify_waiters();
        self.shared.not_full.notify_waiters();
        Ok(())
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Returns whether the queue currently buffers nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// The configured capacity; zero means rendezvous.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T> QueueReceiver<T> {
    /// Dequeues the oldest item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and fully drained. Items
    /// come out strictly in insertion order. Cancel-safe: a dropped `pop`
    /// never consumes an item.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.shared.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.shared.state.lock();
                if let Some(item) = state.items.pop_front() {
                    state.pops += 1;
                    drop(state);
                    self.shared.not_full.notify_waiters();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Dequeues the oldest item without waiting, or `None` if nothing is
    /// buffered right now.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        let item = state.items.pop_front()?;
        state.pops += 1;
        drop(state);
        self.shared.not_full.notify_waiters();
        Some(item)
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Returns whether the queue currently buffers nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// The configured capacity; zero means rendezvous.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl<T> fmt::Debug for QueueSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> fmt::Debug for QueueReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueReceiver")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
