//! Thread-safe lazy-initialization holders.
//!
//! A lazy holder owns a factory and, after its first access, the single value
//! that factory produced. The factory runs exactly once even when many threads
//! access the holder at the same time; every thread then reads the same,
//! fully constructed instance with no further locking.
//!
//! - [`Lazy<T, F>`]: the factory is an infallible `FnOnce() -> T`.
//! - [`TryLazy<T, E, F>`]: the factory is a fallible `FnMut() -> Result<T, E>`
//!   that is retried after an `Err` until it succeeds once.
//!
//! Both use an atomic state word with `parking_lot`'s futex-based parking for
//! threads that arrive while the factory is still running.
//!
//! # Failure policy
//!
//! - An `Err` returned by a [`TryLazy`] factory goes to the caller that ran it.
//!   The holder stays uninitialized and the next access retries.
//! - A panicking factory poisons the holder for good. The panic unwinds
//!   through the caller that ran it; later accesses panic too, and
//!   [`Lazy::try_access`] returns [`PoisonError`].
//!
//! # Thread safety of the value
//!
//! Only construction is synchronized. Once built, the value is handed out as
//! `&T` to any number of threads and as `&mut T` through the exclusive
//! [`Lazy::access_mut`]; sharing mutable state across threads after that is
//! up to `T` itself (atomics, a `Mutex` inside, and so on).
//!
//! # Examples
//!
//! ## Default factory
//!
//! ```rust
//! use lazy_holder::Lazy;
//!
//! let names: Lazy<Vec<String>> = Lazy::default();
//! assert!(!names.value_created());
//! assert!(names.access().is_empty());
//! assert!(names.value_created());
//! ```
//!
//! ## Custom factory shared across threads
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use lazy_holder::Lazy;
//!
//! static BUILDS: AtomicUsize = AtomicUsize::new(0);
//! static TABLE: Lazy<Vec<u64>> = Lazy::new(|| {
//!     BUILDS.fetch_add(1, Ordering::Relaxed);
//!     (0..16).map(|i| i * i).collect()
//! });
//!
//! std::thread::scope(|s| {
//!     for _ in 0..4 {
//!         s.spawn(|| assert_eq!(TABLE.access()[3], 9));
//!     }
//! });
//! assert_eq!(BUILDS.load(Ordering::Relaxed), 1);
//! ```

/// Errors reported by the holders.
mod error;

/// Infallible lazy holder.
mod lazy;

/// Factory/value storage union.
mod slot;

/// One-time initialization gate.
mod state;

/// Fallible lazy holder.
mod try_lazy;

pub use error::PoisonError;
pub use lazy::Lazy;
pub use try_lazy::TryLazy;
