//! Lazily constructed value with a fallible factory.
//!
//! [`TryLazy<T, E, F>`] is the fallible counterpart of [`Lazy`](crate::Lazy).
//! Its factory returns `Result<T, E>` and is kept around until it succeeds:
//!
//! - `Ok(value)` is stored and every caller, now and later, gets a reference to it.
//! - `Err(e)` is handed to the thread whose call ran the factory. The holder
//!   stays uninitialized, threads that were waiting wake up, and the next
//!   access runs the factory again.
//! - A panic poisons the holder exactly as it does for `Lazy`.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::Ordering;
use core::{fmt, mem};
use std::panic::{RefUnwindSafe, UnwindSafe};

use crate::error::poisoned;
use crate::slot::Slot;
use crate::state::{Entry, InitGate};

/// A value constructed on first successful access by a stored fallible factory.
///
/// ```rust
/// use lazy_holder::TryLazy;
///
/// let port: TryLazy<u16, std::num::ParseIntError> = TryLazy::new(|| "8080".parse());
/// assert_eq!(port.try_access(), Ok(&8080));
/// ```
pub struct TryLazy<T, E, F = fn() -> Result<T, E>> {
   slot: UnsafeCell<Slot<F, T>>,
   gate: InitGate,
   _error: PhantomData<fn() -> E>,
}

impl<T, E, F> TryLazy<T, E, F> {
   /// Creates a holder that will build its value with `factory` on first access.
   #[inline]
   #[must_use]
   pub const fn new(factory: F) -> Self {
      Self {
         slot: UnsafeCell::new(Slot::pending(factory)),
         gate: InitGate::new(),
         _error: PhantomData,
      }
   }

   /// Creates a holder that already contains `value`.
   #[inline]
   #[must_use]
   pub const fn with_value(value: T) -> Self {
      Self {
         slot: UnsafeCell::new(Slot::ready(value)),
         gate: InitGate::done(),
         _error: PhantomData,
      }
   }

   /// Reports whether the value has been constructed. Relaxed and best-effort.
   #[inline]
   pub fn value_created(&self) -> bool {
      self.gate.is_done(Ordering::Relaxed)
   }

   /// Reports whether a previous factory call panicked. Relaxed and best-effort.
   #[inline]
   pub fn is_poisoned(&self) -> bool {
      self.gate.is_poisoned(Ordering::Relaxed)
   }

   /// Returns the value if it has been constructed, without running the factory.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      if self.gate.is_done(Ordering::Acquire) {
         // SAFETY: DONE observed with Acquire; the value is live and published.
         Some(unsafe { (*self.slot.get()).value() })
      } else {
         None
      }
   }

   /// Returns the value mutably if it has been constructed.
   #[inline]
   pub fn get_mut(&mut self) -> Option<&mut T> {
      if self.gate.is_done(Ordering::Relaxed) {
         // SAFETY: the value is live and `&mut self` is exclusive.
         Some(unsafe { self.slot.get_mut().value_mut() })
      } else {
         None
      }
   }

   /// Consumes the holder, returning the value or the factory that never succeeded.
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
      // SAFETY: the gate says which field is live, and `this` is never dropped.
      unsafe {
         if done {
            Ok(slot.take_value())
         } else {
            Err(slot.take_factory())
         }
      }
   }
}

impl<T, E, F: FnMut() -> Result<T, E>> TryLazy<T, E, F> {
   /// Returns the value, running the factory first if no call has succeeded yet.
   ///
   /// Concurrent callers park while one of them runs the factory. If it fails,
   /// only that caller receives the error; one of the parked callers then
   /// retries.
   ///
   /// # Panics
   ///
   /// Panics if the factory panics, and on every call after that.
   #[inline]
   pub fn try_access(&self) -> Result<&T, E> {
      if let Some(value) = self.get() {
         return Ok(value);
      }
      self.try_initialize(self.gate.enter())?;
      // SAFETY: `try_initialize` only returns `Ok` once the value is published.
      Ok(unsafe { (*self.slot.get()).value() })
   }

   /// Like [`try_access`](Self::try_access), but yields to the tokio runtime
   /// while another thread runs the factory.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn try_access_async(&self) -> Result<&T, E> {
      if let Some(value) = self.get() {
         return Ok(value);
      }
      self.try_initialize(self.gate.enter_async().await)?;
      // SAFETY: see `try_access`.
      Ok(unsafe { (*self.slot.get()).value() })
   }

   /// Returns the value mutably, running the factory first if needed. Never blocks.
   ///
   /// # Panics
   ///
   /// Panics if the factory panics, or if the holder is already poisoned.
   pub fn try_access_mut(&mut self) -> Result<&mut T, E> {
      match self.gate.try_enter() {
         Some(Entry::Done) => {}
         Some(Entry::Poisoned) => poisoned(),
         Some(Entry::Locked(guard)) => {
            let slot = self.slot.get_mut();
            // SAFETY: neither DONE nor POISONED, so the factory is live.
            let factory = unsafe { slot.factory_mut() };
            match factory() {
               Ok(value) => {
                  // SAFETY: the factory is moved out before the value overwrites it.
                  let factory = unsafe { slot.take_factory() };
                  unsafe { slot.write_value(value) };
                  guard.commit();
                  drop(factory);
               }
               Err(err) => {
                  guard.reset();
                  return Err(err);
               }
            }
         }
         None => unreachable!("initialization in progress despite exclusive access"),
      }
      // SAFETY: the value is live and `&mut self` is exclusive.
      Ok(unsafe { self.slot.get_mut().value_mut() })
   }

   /// Runs the factory if `entry` says we won the gate.
   #[cold]
   fn try_initialize(&self, entry: Entry<'_>) -> Result<(), E> {
      let guard = match entry {
         Entry::Done => return Ok(()),
         Entry::Poisoned => poisoned(),
         Entry::Locked(guard) => guard,
      };
      // SAFETY: holding the gate gives exclusive access to the slot, and the
      // factory stays live until a value replaces it. If the factory unwinds,
      // `guard` poisons the gate and the factory is dropped with the holder.
      let slot = unsafe { &mut *self.slot.get() };
      let factory = unsafe { slot.factory_mut() };
      match factory() {
         Ok(value) => {
            // SAFETY: the factory is moved out before the value overwrites it.
            let factory = unsafe { slot.take_factory() };
            unsafe { slot.write_value(value) };
            guard.commit();
            // Only after publishing: a panicking destructor must not poison a stored value.
            drop(factory);
            Ok(())
         }
         Err(err) => {
            guard.reset();
            Err(err)
         }
      }
   }
}

impl<T: fmt::Debug, E, F> fmt::Debug for TryLazy<T, E, F> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_tuple("TryLazy");
      match self.get() {
         Some(v) => d.field(v),
         None if self.is_poisoned() => d.field(&format_args!("<poisoned>")),
         None => d.field(&format_args!("<uninit>")),
      };
      d.finish()
   }
}

// SAFETY:
// As for `Lazy`. Errors are produced and returned on the calling thread, so
// `E` needs no bound.
unsafe impl<T: Send + Sync, E, F: Send> Sync for TryLazy<T, E, F> {}
// SAFETY:
// Moving the holder moves the factory or the value along with it.
unsafe impl<T: Send, E, F: Send> Send for TryLazy<T, E, F> {}

// An unwinding factory poisons the holder; a half-built value is never observable.
impl<T: RefUnwindSafe + UnwindSafe, E, F: UnwindSafe> RefUnwindSafe for TryLazy<T, E, F> {}
impl<T: RefUnwindSafe + UnwindSafe, E, F: UnwindSafe> UnwindSafe for TryLazy<T, E, F> {}

impl<T, E, F> Drop for TryLazy<T, E, F> {
   #[inline]
   fn drop(&mut self) {
      let slot = self.slot.get_mut();
      // SAFETY: `&mut self` is exclusive. Until a value is stored the factory
      // stays live, including after a panic poisoned the gate.
      unsafe {
         if self.gate.is_done(Ordering::Relaxed) {
            slot.drop_value();
         } else {
            slot.drop_factory();
         }
      }
   }
}
