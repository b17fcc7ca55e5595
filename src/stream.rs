//! Allow several consumers to independently consume one stream of values.
//!
//! The [`Dispatcher`] is the producer side. Each [`Listener`] is a consumer with
//! its own position in the stream: it has a private queue of the values which
//! were dispatched since it was created, and it pops values off that queue at its own pace.
//! One listener consuming a value does not take it away from any other listener.

use std::{collections::HashMap, fmt::Debug, fmt::Display, sync::Arc, time::Duration};

use futures::{channel::mpsc, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{error::Error, timeout::TimeoutCalculator};

/// Identifies a registered listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// A new, unique, listener id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct Shared<T> {
    closed: bool,
    queues: HashMap<ListenerId, mpsc::UnboundedSender<T>>,
}

/// The producer side of a stream.
///
/// Cloning gives another handle to the same stream.
#[derive(Debug)]
pub struct Dispatcher<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Dispatcher<T> {
    /// An open dispatcher without listeners.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                closed: false,
                queues: HashMap::new(),
            })),
        }
    }

    /// Register a new listener.
    ///
    /// Dispatched values will appear in the returned queue, starting from the
    /// time of registration.
    /// If the dispatcher is closed the queue is already at its end.
    pub fn add_listener(&self, id: ListenerId) -> mpsc::UnboundedReceiver<T> {
        let (sender, receiver) = mpsc::unbounded();

        let mut shared = self.shared.lock();
        if !shared.closed {
            shared.queues.insert(id, sender);
        }

        receiver
    }

    /// Stop receiving values.
    ///
    /// Values the listener has not consumed yet are lost.
    pub fn remove_listener(&self, id: &ListenerId) {
        self.shared.lock().queues.remove(id);
    }

    /// End the stream.
    ///
    /// Each listener will see the values already dispatched to it,
    /// then the end of the stream.
    /// Closing more than once does nothing.
    pub fn close(&self) {
        let mut shared = self.shared.lock();
        if shared.closed {
            return;
        }
        shared.closed = true;

        let listeners = shared.queues.len();
        for (_, queue) in shared.queues.drain() {
            queue.close_channel();
        }

        debug!(%listeners, "Dispatcher closed");
    }

    /// Has [`Dispatcher::close`] been called?
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// How many listeners are registered right now.
    pub fn listener_count(&self) -> usize {
        self.shared.lock().queues.len()
    }

    /// Start listening. See [`Listener`].
    pub fn listen(&self) -> Listener<T> {
        Listener::new(self)
    }
}

impl<T: Clone> Dispatcher<T> {
    /// Distribute a value to each listener.
    ///
    /// This is called by the producer.
    pub fn dispatch(&self, value: T) -> Result<(), Error> {
        let shared = self.shared.lock();
        if shared.closed {
            return Err(Error::Closed);
        }

        for (id, queue) in &shared.queues {
            if queue.unbounded_send(value.clone()).is_err() {
                trace!(%id, "Listener queue gone");
            }
        }

        Ok(())
    }
}

/// The consumer side of a stream.
///
/// Registered with its dispatcher while it is alive.
/// Dropping it deregisters it, discarding anything left in its queue.
#[derive(Debug)]
pub struct Listener<T> {
    id: ListenerId,
    dispatcher: Dispatcher<T>,
    queue: mpsc::UnboundedReceiver<T>,
}

impl<T> Listener<T> {
    /// Register a new listener with the dispatcher.
    pub fn new(dispatcher: &Dispatcher<T>) -> Self {
        let id = ListenerId::new();
        debug!(%id, "Listening");

        let queue = dispatcher.add_listener(id.clone());

        Self {
            id,
            dispatcher: dispatcher.clone(),
            queue,
        }
    }

    /// Borrow the [`ListenerId`].
    pub fn id(&self) -> &ListenerId {
        &self.id
    }

    async fn pop(&mut self, timeout: Duration) -> Result<T, Error> {
        match tokio::time::timeout(timeout, self.queue.next()).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(Error::EndOfStream),
            Err(_elapsed) => Err(Error::Timeout { timeout }),
        }
    }
}

impl<T: Debug> Listener<T> {
    /// Return the next value in the stream and advance the current position.
    pub async fn next(&mut self, timeout: Duration) -> Result<T, Error> {
        let value = self.pop(timeout).await?;
        debug!(?value, "next");

        Ok(value)
    }

    /// Consume the next value in the stream and check that it matches `expected`.
    pub async fn expect_next<Q>(&mut self, expected: &Q, timeout: Duration) -> Result<(), Error>
    where
        Q: Debug + ?Sized,
        T: PartialEq<Q>,
    {
        debug!(?expected, "expect_next");

        let actual = self.pop(timeout).await?;
        if actual == *expected {
            Ok(())
        } else {
            Err(Error::Mismatch {
                expected: format!("{expected:?}"),
                actual: format!("{actual:?}"),
            })
        }
    }

    /// Consume values in the stream until one matching `expected` is found.
    ///
    /// All the reads share one `timeout`.
    /// Returns how many values were skipped.
    pub async fn skip_until<Q>(&mut self, expected: &Q, timeout: Duration) -> Result<usize, Error>
    where
        Q: Debug + ?Sized,
        T: PartialEq<Q>,
    {
        debug!(?expected, "skip_until");

        let deadline = TimeoutCalculator::new(timeout);
        let mut skipped = 0;

        loop {
            let value = match self.pop(deadline.time_left_now()).await {
                Err(Error::Timeout { .. }) => return Err(Error::Timeout { timeout }),
                other => other?,
            };

            if value == *expected {
                debug!(%skipped, "skipped lines");
                return Ok(skipped);
            }

            trace!(?value, "skip");
            skipped += 1;
        }
    }
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        debug!(%self.id, "No longer listening");
        self.dispatcher.remove_listener(&self.id);
    }
}
