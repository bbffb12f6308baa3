use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use crate::Error;

/// A one-shot completion flag with continuation fan-out and no payload.
///
/// A `Signal` starts pending and is completed at most once; every clone
/// shares the same state. Threads may block on it with [`wait`], tasks may
/// `.await` a clone of it, and callbacks registered with [`register`] run
/// exactly once when completion happens.
///
/// [`wait`]: Signal::wait
/// [`register`]: Signal::register
///
/// # Examples
///
/// ```
/// use deferred_result::Signal;
/// use std::thread;
///
/// let signal = Signal::new();
/// let done = signal.clone();
/// let waiter = thread::spawn(move || done.wait());
/// signal.complete();
/// waiter.join().expect("The waiter thread has panicked");
/// ```
#[derive(Clone)]
pub struct Signal {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    done: Condvar,
}

struct Inner {
    completed: bool,
    continuations: Vec<Box<dyn FnOnce() + Send>>,
    wakers: Vec<Waker>, // every parked task, not just the last one; clones
                        // of one signal may be awaited from several tasks
}

impl Signal {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    completed: false,
                    continuations: Vec::new(),
                    wakers: Vec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Registers a callback to run once on completion.
    ///
    /// While the signal is pending the callback is stored; callbacks fire in
    /// registration order on the thread that completes the signal. If the
    /// signal has already completed the callback runs immediately on the
    /// calling thread instead of being stored.
    pub fn register<F>(&self, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut inner = self.shared.inner.lock().unwrap();
        if !inner.completed {
            inner.continuations.push(Box::new(continuation));
            return;
        }
        drop(inner);
        continuation();
    }

    /// Moves the signal into the completed state.
    ///
    /// Exactly one caller wins under concurrent attempts and returns `true`;
    /// the winner wakes every blocked waiter and parked task, then invokes
    /// the registered callbacks in registration order. Later calls are
    /// no-ops returning `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred_result::Signal;
    ///
    /// let signal = Signal::new();
    /// assert!(signal.complete());
    /// assert!(!signal.complete());
    /// ```
    pub fn complete(&self) -> bool {
        let continuations = {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.completed {
                return false;
            }
            inner.completed = true;
            self.shared.done.notify_all();
            for waker in inner.wakers.drain(..) {
                waker.wake();
            }
            std::mem::take(&mut inner.continuations)
        };
        // Run outside the lock: a continuation may register on this same
        // signal, which would otherwise deadlock.
        for continuation in continuations {
            continuation();
        }
        true
    }

    /// Blocks the calling thread until the signal completes. Returns
    /// immediately when already completed; any number of threads may wait
    /// concurrently.
    pub fn wait(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        while !inner.completed {
            inner = self.shared.done.wait(inner).unwrap();
        }
    }

    /// Blocks until the signal completes or `timeout` elapses, whichever
    /// comes first. A timed-out wait leaves the signal untouched: it can be
    /// waited on again and other waiters are unaffected.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock().unwrap();
        while !inner.completed {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(Error::Timeout)?;
            let (guard, result) = self.shared.done.wait_timeout(inner, remaining).unwrap();
            inner = guard;
            if result.timed_out() && !inner.completed {
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    /// Non-blocking probe of the completion state.
    pub fn is_completed(&self) -> bool {
        self.shared.inner.lock().unwrap().completed
    }

    pub(crate) fn poll_completed(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.completed {
            Poll::Ready(())
        } else {
            inner.wakers.push(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl Future for Signal {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.poll_completed(cx)
    }
}
