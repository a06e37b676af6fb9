//! Lazily constructed value with an infallible factory.
//!
//! [`Lazy<T, F>`] stores a factory `F` and turns it into a `T` the first time the
//! value is accessed. The factory runs exactly once, no matter how many threads
//! race on the first access; everyone else parks until it has finished and then
//! reads the same instance without further synchronization.
//!
//! A factory that panics poisons the holder: the panic unwinds through the
//! thread that ran it, and every later access panics as well (or returns
//! [`PoisonError`] from [`Lazy::try_access`]).

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::Ordering;
use core::{fmt, mem};
use std::panic::{RefUnwindSafe, UnwindSafe};

use crate::error::{poisoned, PoisonError};
use crate::slot::Slot;
use crate::state::{Entry, InitGate};

/// A value constructed on first access by a stored factory.
///
/// `Lazy` is neither `Clone` nor `Copy`: there is one gate and one value per
/// holder. Share it by reference, through an `Arc`, or in a `static`.
///
/// ```rust
/// use lazy_holder::Lazy;
///
/// static GREETING: Lazy<String> = Lazy::new(|| "hello".to_uppercase());
///
/// assert!(!GREETING.value_created());
/// assert_eq!(GREETING.access(), "HELLO");
/// assert!(GREETING.value_created());
/// ```
pub struct Lazy<T, F = fn() -> T> {
   slot: UnsafeCell<Slot<F, T>>,
   gate: InitGate,
}

impl<T, F> Lazy<T, F> {
   /// Creates a holder that will build its value with `factory` on first access.
   #[inline]
   #[must_use]
   pub const fn new(factory: F) -> Self {
      Self {
         slot: UnsafeCell::new(Slot::pending(factory)),
         gate: InitGate::new(),
      }
   }

   /// Creates a holder that already contains `value`. The factory is never needed.
   #[inline]
   #[must_use]
   pub const fn with_value(value: T) -> Self {
      Self {
         slot: UnsafeCell::new(Slot::ready(value)),
         gate: InitGate::done(),
      }
   }

   /// Reports whether the value has been constructed.
   ///
   /// This is a relaxed, best-effort read meant for diagnostics. A `false` may
   /// already be stale by the time it is returned; never use it to decide
   /// whether [`access`](Self::access) needs to be called.
   #[inline]
   pub fn value_created(&self) -> bool {
      self.gate.is_done(Ordering::Relaxed)
   }

   /// Reports whether a previous factory call panicked. Best-effort, like
   /// [`value_created`](Self::value_created).
   #[inline]
   pub fn is_poisoned(&self) -> bool {
      self.gate.is_poisoned(Ordering::Relaxed)
   }

   /// Returns the value if it has been constructed, without running the factory.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      if self.gate.is_done(Ordering::Acquire) {
         // SAFETY: DONE was observed with Acquire, so the value is live and its
         // write happens-before this read.
         Some(unsafe { (*self.slot.get()).value() })
      } else {
         None
      }
   }

   /// Returns the value mutably if it has been constructed, without running the factory.
   #[inline]
   pub fn get_mut(&mut self) -> Option<&mut T> {
      if self.gate.is_done(Ordering::Relaxed) {
         // SAFETY: the value is live and `&mut self` is exclusive.
         Some(unsafe { self.slot.get_mut().value_mut() })
      } else {
         None
      }
   }

   /// Consumes the holder.
   ///
   /// Returns `Ok(value)` if the value was constructed, or `Err(factory)` with
   /// the unused factory otherwise.
   ///
   /// # Panics
   ///
   /// Panics if the holder is poisoned.
   pub fn into_inner(self) -> Result<T, F> {
      if self.is_poisoned() {
         poisoned();
      }
      let done = self.gate.is_done(Ordering::Relaxed);
      let mut this = mem::ManuallyDrop::new(self);
      let slot = this.slot.get_mut();
      // SAFETY: the gate says which field is live; `this` will not be dropped,
      // so the field we move out is not dropped a second time.
      unsafe {
         if done {
            Ok(slot.take_value())
         } else {
            Err(slot.take_factory())
         }
      }
   }
}

impl<T, F: FnOnce() -> T> Lazy<T, F> {
   /// Returns the value, running the factory first if nobody has yet.
   ///
   /// If another thread is running the factory, this call parks until it is
   /// done. Calling `access` on the same holder from inside its own factory
   /// deadlocks.
   ///
   /// # Panics
   ///
   /// Panics if the factory panics, and on every call after that.
   #[inline]
   pub fn access(&self) -> &T {
      match self.try_access() {
         Ok(value) => value,
         Err(_) => poisoned(),
      }
   }

   /// Like [`access`](Self::access), but reports a poisoned holder as an error.
   ///
   /// A panic raised by the factory during this call still unwinds through
   /// the caller; only later calls see `Err(PoisonError)`.
   #[inline]
   pub fn try_access(&self) -> Result<&T, PoisonError> {
      if let Some(value) = self.get() {
         return Ok(value);
      }
      self.initialize(self.gate.enter())?;
      // SAFETY: `initialize` only returns `Ok` once the value is published.
      Ok(unsafe { (*self.slot.get()).value() })
   }

   /// Like [`access`](Self::access), but waits for a concurrent initialization
   /// by yielding to the tokio runtime instead of parking the worker thread.
   ///
   /// The factory itself still runs synchronously on the task that wins.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn access_async(&self) -> &T {
      if let Some(value) = self.get() {
         return value;
      }
      if self.initialize(self.gate.enter_async().await).is_err() {
         poisoned();
      }
      // SAFETY: see `try_access`.
      unsafe { (*self.slot.get()).value() }
   }

   /// Returns the value mutably, running the factory first if needed.
   ///
   /// Exclusive access means this never blocks.
   ///
   /// # Panics
   ///
   /// Panics if the factory panics, or if the holder is already poisoned.
   pub fn access_mut(&mut self) -> &mut T {
      match self.gate.try_enter() {
         Some(Entry::Done) => {}
         Some(Entry::Poisoned) => poisoned(),
         Some(Entry::Locked(guard)) => {
            let slot = self.slot.get_mut();
            // SAFETY: the gate was neither DONE nor POISONED, so the factory is
            // live; if it unwinds, `guard` poisons the gate and the slot is
            // treated as empty from then on.
            unsafe {
               let factory = slot.take_factory();
               slot.write_value(factory());
            }
            guard.commit();
         }
         None => unreachable!("initialization in progress despite exclusive access"),
      }
      // SAFETY: the value is live and `&mut self` is exclusive.
      unsafe { self.slot.get_mut().value_mut() }
   }

   /// Runs the factory if `entry` says we won the gate.
   #[cold]
   fn initialize(&self, entry: Entry<'_>) -> Result<(), PoisonError> {
      let guard = match entry {
         Entry::Done => return Ok(()),
         Entry::Poisoned => return Err(PoisonError),
         Entry::Locked(guard) => guard,
      };
      // SAFETY: holding the gate gives us exclusive access to the slot, and the
      // factory is live because the gate was neither DONE nor POISONED. Readers
      // touch the slot only after observing DONE.
      unsafe {
         let slot = &mut *self.slot.get();
         let factory = slot.take_factory();
         slot.write_value(factory());
      }
      guard.commit();
      Ok(())
   }
}

impl<T: Default> Default for Lazy<T> {
   /// Creates a holder whose factory is `T::default`.
   #[inline]
   fn default() -> Self {
      Self::new(T::default)
   }
}

impl<T, F> From<T> for Lazy<T, F> {
   /// Creates a holder that already contains `value`.
   #[inline]
   fn from(value: T) -> Self {
      Self::with_value(value)
   }
}

impl<T, F: FnOnce() -> T> Deref for Lazy<T, F> {
   type Target = T;

   #[inline]
   fn deref(&self) -> &T {
      self.access()
   }
}

impl<T, F: FnOnce() -> T> DerefMut for Lazy<T, F> {
   #[inline]
   fn deref_mut(&mut self) -> &mut T {
      self.access_mut()
   }
}

impl<T: fmt::Debug, F> fmt::Debug for Lazy<T, F> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_tuple("Lazy");
      match self.get() {
         Some(v) => d.field(v),
         None if self.is_poisoned() => d.field(&format_args!("<poisoned>")),
         None => d.field(&format_args!("<uninit>")),
      };
      d.finish()
   }
}

impl<T: fmt::Display, F> fmt::Display for Lazy<T, F> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self.get() {
         Some(v) => fmt::Display::fmt(v, f),
         None if self.is_poisoned() => f.write_str("<poisoned>"),
         None => f.write_str("<uninit>"),
      }
   }
}

// SAFETY:
// Sharing `&Lazy` lets any thread run the factory (so `F: Send`) and lets every
// thread read the value (so `T: Sync`) that was built on another thread (so `T: Send`).
unsafe impl<T: Send + Sync, F: Send> Sync for Lazy<T, F> {}
// SAFETY:
// Moving the holder moves the factory or the value along with it.
unsafe impl<T: Send, F: Send> Send for Lazy<T, F> {}

// An unwinding factory poisons the holder; a half-built value is never observable.
impl<T: RefUnwindSafe + UnwindSafe, F: UnwindSafe> RefUnwindSafe for Lazy<T, F> {}
impl<T: RefUnwindSafe + UnwindSafe, F: UnwindSafe> UnwindSafe for Lazy<T, F> {}

impl<T, F> Drop for Lazy<T, F> {
   #[inline]
   fn drop(&mut self) {
      let slot = self.slot.get_mut();
      // SAFETY: `&mut self` is exclusive. A poisoned holder consumed its factory
      // and never stored a value, so nothing is live.
      unsafe {
         if self.gate.is_done(Ordering::Relaxed) {
            slot.drop_value();
         } else if !self.gate.is_poisoned(Ordering::Relaxed) {
            slot.drop_factory();
         }
      }
   }
}
