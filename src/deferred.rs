use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use crate::signal::Signal;
use crate::Error;

/// A write-once container for a value produced on another thread.
///
/// A `Deferred<T>` is a [`Signal`] plus a payload: it is completed exactly
/// once with a value, and every consumer (blocking, polling, awaiting, or
/// registered as a continuation) observes that same value as an `Arc<T>`.
/// Clones share state, so one handle can be moved into the producer thread
/// while others stay with the consumers.
///
/// Chaining with [`apply_then`] derives a new `Deferred` whose value is
/// computed from this one's, which composes into synchronous transformation
/// pipelines hanging off a single asynchronous source.
///
/// [`apply_then`]: Deferred::apply_then
///
/// # Examples
///
/// ```
/// use deferred_result::Deferred;
/// use std::thread;
///
/// let result = Deferred::<u32>::new();
/// let completer = result.clone();
/// let producer = thread::spawn(move || {
///     completer.complete(21);
/// });
/// assert_eq!(*result.apply_then(|n| *n * 2).get(), 42);
/// producer.join().expect("The producer thread has panicked");
/// ```
pub struct Deferred<T> {
    signal: Signal,
    value: Arc<Mutex<Option<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// Constructs a pending deferred result with no payload.
    pub fn new() -> Self {
        Self {
            signal: Signal::new(),
            value: Arc::new(Mutex::new(None)),
        }
    }

    /// Constructs an already-completed deferred result. Used when the value
    /// is known up front and no asynchronous work is needed.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred_result::Deferred;
    ///
    /// let cached = Deferred::completed("hit".to_owned());
    /// assert_eq!(*cached.get(), "hit");
    /// ```
    pub fn completed(value: T) -> Self {
        let deferred = Self::new();
        deferred.complete(value);
        deferred
    }

    /// Completes with `value`, waking all waiters and running all
    /// registered continuations.
    ///
    /// Only the first call has any effect and returns `true`; later calls
    /// return `false` and never overwrite the stored payload nor re-run
    /// continuations.
    pub fn complete(&self, value: T) -> bool {
        {
            let mut slot = self.value.lock().unwrap();
            if slot.is_some() {
                return false;
            }
            // The payload must be in place before the signal flips, so that
            // anything released by the signal finds it.
            *slot = Some(Arc::new(value));
        }
        self.signal.complete()
    }

    /// Blocks until completed, then returns the payload. Safe to call any
    /// number of times; every call returns the same payload.
    pub fn get(&self) -> Arc<T> {
        self.signal.wait();
        self.read()
    }

    /// Blocks until completed or until `timeout` elapses. A timed-out call
    /// returns [`Error::Timeout`] and leaves the deferred result intact: a
    /// later [`get`] still blocks for and returns the payload, and
    /// concurrent waiters are unaffected.
    ///
    /// [`get`]: Deferred::get
    pub fn get_timeout(&self, timeout: Duration) -> Result<Arc<T>, Error> {
        self.signal.wait_timeout(timeout)?;
        Ok(self.read())
    }

    /// Non-blocking read: the payload if completed, `None` otherwise.
    pub fn try_get(&self) -> Option<Arc<T>> {
        if self.signal.is_completed() {
            Some(self.read())
        } else {
            None
        }
    }

    pub fn is_completed(&self) -> bool {
        self.signal.is_completed()
    }

    /// Registers a consumer of the payload and hands back the underlying
    /// [`Signal`] for terminal chaining (waiting until the side effect ran,
    /// registering further zero-argument callbacks).
    ///
    /// Pending source: the consumer is stored and runs on the completing
    /// thread. Completed source: the consumer runs immediately on the
    /// calling thread with the known payload. Either way it runs exactly
    /// once.
    pub fn on_complete<F>(&self, consumer: F) -> Signal
    where
        F: FnOnce(Arc<T>) + Send + 'static,
    {
        let slot = Arc::clone(&self.value);
        self.signal.register(move || {
            let value = slot
                .lock()
                .unwrap()
                .clone()
                .expect("completed without a stored value");
            consumer(value);
        });
        self.signal.clone()
    }

    /// Derives a new deferred result completed with `transform(payload)`.
    ///
    /// The transform runs exactly once, strictly after this instance
    /// completes; the returned instance completes once the transform
    /// returns. If this instance is already completed the transform runs
    /// synchronously before `apply_then` returns, so the returned instance
    /// is completed as well.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred_result::Deferred;
    ///
    /// let source = Deferred::completed(2);
    /// let chained = source.apply_then(|n| *n + 1).apply_then(|n| *n * 10);
    /// assert_eq!(*chained.get(), 30);
    /// ```
    pub fn apply_then<U, F>(&self, transform: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(Arc<T>) -> U + Send + 'static,
    {
        let next = Deferred::new();
        let link = next.clone();
        self.on_complete(move |value| {
            link.complete(transform(value));
        });
        next
    }

    fn read(&self) -> Arc<T> {
        self.value
            .lock()
            .unwrap()
            .clone()
            .expect("completed without a stored value")
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for Deferred<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("completed", &self.signal.is_completed())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Future for Deferred<T> {
    type Output = Arc<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.signal.poll_completed(cx) {
            Poll::Ready(()) => Poll::Ready(self.read()),
            Poll::Pending => Poll::Pending,
        }
    }
}
