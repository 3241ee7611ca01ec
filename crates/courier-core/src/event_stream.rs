//! Topic → listener registry with synchronous fan-out.

use std::{
    collections::HashMap,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, PoisonError, RwLock},
};

/// Callback registered for a topic.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
#[must_use]
pub fn listener<T, F>(f: F) -> Listener<T>
where
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Event multiplexer.
///
/// Listeners are kept per topic in registration order and are never
/// removed. Cloning shares the same pool.
pub struct EventStream<T> {
    pool: Arc<RwLock<HashMap<String, Vec<Listener<T>>>>>,
}

impl<T> Default for EventStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<T> EventStream<T> {
    /// Create an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Append a listener to `topic`.
    ///
    /// Returns `self` so registrations can be chained.
    pub fn subscribe(&self, topic: impl Into<String>, listener: Listener<T>) -> &Self {
        self.pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.into())
            .or_default()
            .push(listener);
        self
    }

    /// Call every listener of `topic` with `value`, in registration order.
    ///
    /// Listeners run outside the registry lock, so they may subscribe more
    /// listeners; those only see later notifications. A panicking listener
    /// is logged and skipped. Returns how many listeners were called.
    pub fn notify(&self, topic: &str, value: &T) -> usize {
        let listeners = match self
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
        {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };

        for (index, listener) in listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
                tracing::error!(topic, index, "Listener panicked");
            }
        }
        listeners.len()
    }

    /// Whether any listener was ever registered for `topic`.
    #[must_use]
    pub fn has_topic(&self, topic: &str) -> bool {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(topic)
    }

    /// Number of listeners registered for `topic`.
    #[must_use]
    pub fn listener_count(&self, topic: &str) -> usize {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Number of topics with at least one listener.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.pool.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = self.pool.read().unwrap_or_else(PoisonError::into_inner);
        let mut map = f.debug_map();
        for (topic, listeners) in pool.iter() {
            map.entry(topic, &listeners.len());
        }
        map.finish()
    }
}

/// Notify `topic` on `stream`.
pub fn emit<T>(topic: &str, value: &T, stream: &EventStream<T>) -> usize {
    stream.notify(topic, value)
}

/// Bind a topic to a stream, producing a plain callback.
pub fn emitter<T>(topic: impl Into<String>, stream: EventStream<T>) -> impl Fn(&T) -> usize {
    let topic = topic.into();
    move |value: &T| stream.notify(&topic, value)
}
