//! Write-once deferred results for coordinating one producer thread with
//! arbitrarily many consumers.
//!
//! A [`Deferred`] is completed exactly once and observed any number of
//! times: consumers may block on it, poll it, `.await` a clone of it, or
//! register continuations that run when the value arrives. Continuations
//! chained with [`Deferred::apply_then`] produce a new `Deferred` carrying
//! the transformed value, which is how the bundled [`refresh`] layer turns a
//! raw fetch response into a cached configuration value.
//!
//! # Examples
//!
//! ```
//! use deferred_result::Deferred;
//! use std::thread;
//!
//! let result = Deferred::<String>::new();
//! let completer = result.clone();
//! let worker = thread::spawn(move || {
//!     completer.complete("ready".to_owned());
//! });
//!
//! let doubled = result.apply_then(|value| format!("{value}, {value}"));
//! assert_eq!(*doubled.get(), "ready, ready");
//! worker.join().expect("The worker thread has panicked");
//! ```
use thiserror::Error;

pub mod deferred;
pub mod refresh;
pub mod signal;

pub use deferred::Deferred;
pub use signal::Signal;

/// The only error produced by this crate: a deadline elapsed before the
/// value arrived. Everything else (failed fetches included) travels through
/// the payload itself.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("timed out waiting for completion")]
    Timeout,
}
