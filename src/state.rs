//! One-time initialization gate shared by [`Lazy`](crate::Lazy) and
//! [`TryLazy`](crate::TryLazy).
//!
//! The gate is a single `AtomicU16`:
//! - Bit 0: DONE - the value has been constructed
//! - Bit 1: LOCKED - a thread is running the factory
//! - Bit 2: WAITING - at least one thread is parked on the gate
//! - Bit 3: POISONED - the factory panicked; terminal
//! - Bits 4-15: EPOCH - bumped on every release so parked threads never miss a wake-up
//!
//! The word is 16 bits wide so that the POISONED flag does not eat into the
//! epoch: a `TryLazy` whose factory keeps failing bumps the epoch once per
//! attempt, and 4096 releases have to land between a waiter's load and its
//! park before the value can repeat.
//!
//! Readers only ever need one `Acquire` load of DONE. Contended initialization
//! parks on the address of the atomic through `parking_lot_core`.

use core::mem;
use core::sync::atomic::{AtomicU16, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Outcome of trying to enter the gate.
pub(crate) enum Entry<'a> {
   /// The caller won the gate and must run the factory.
   Locked(InitGuard<'a>),
   /// The value is already constructed.
   Done,
   /// A previous factory call panicked.
   Poisoned,
}

/// Atomic state of a lazy holder.
#[repr(transparent)]
pub(crate) struct InitGate(AtomicU16);

impl InitGate {
   /// Bit flag: the value is constructed.
   const DONE: u16 = 1;
   /// Bit flag: a thread holds the gate and is running the factory.
   const LOCKED: u16 = 2;
   /// Bit flag: at least one thread is parked waiting for the holder.
   const WAITING: u16 = 4;
   /// Bit flag: the factory unwound; the gate never opens again.
   const POISONED: u16 = 8;
   /// Lowest epoch bit.
   const EPOCH_1: u16 = 16;
   /// Mask for the epoch bits.
   const EPOCH_MASK: u16 = !(Self::DONE | Self::LOCKED | Self::WAITING | Self::POISONED);

   /// Epoch following the one in `current_state`, wrapping within the mask.
   #[inline(always)]
   const fn next_epoch(current_state: u16) -> u16 {
      (current_state & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   /// A gate whose value has not been constructed yet.
   #[inline]
   pub(crate) const fn new() -> Self {
      Self(AtomicU16::new(0))
   }

   /// A gate that starts out constructed.
   #[inline]
   pub(crate) const fn done() -> Self {
      Self(AtomicU16::new(Self::DONE))
   }

   #[inline]
   fn notify_all(&self) {
      // SAFETY: the key is the address of the atomic, the same one `wait` parks on.
      unsafe {
         parking_lot_core::unpark_all(self.0.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the current thread while the gate still reads `expected_state`.
   #[inline]
   fn wait(&self, expected_state: u16) {
      // SAFETY: see `notify_all`.
      unsafe {
         // The validate closure runs under the bucket lock, so a release that
         // lands between our load and the park is never lost.
         let _ = parking_lot_core::park(
            self.0.as_ptr() as usize,
            || self.0.load(Ordering::Acquire) == expected_state,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Swaps in `flags` with a fresh epoch and wakes anyone parked on the old state.
   /// Returns the previous state.
   #[inline]
   fn release(&self, flags: u16) -> u16 {
      let current_state = self.0.load(Ordering::Relaxed);
      let new_state = flags | Self::next_epoch(current_state);
      // Release pairs with the Acquire loads in `is_done` and `enter_step`, so the
      // write of the value (or the factory's side effects) is visible to every
      // thread that observes the new state.
      let prev_state = self.0.swap(new_state, Ordering::Release);
      if prev_state & Self::WAITING != 0 {
         self.notify_all();
      }
      prev_state
   }

   #[inline]
   pub(crate) fn is_done(&self, ordering: Ordering) -> bool {
      self.0.load(ordering) & Self::DONE != 0
   }

   #[inline]
   pub(crate) fn is_poisoned(&self, ordering: Ordering) -> bool {
      self.0.load(ordering) & Self::POISONED != 0
   }

   /// Single attempt at entering the gate.
   ///
   /// Returns `Err(state)` when another thread holds the lock. With `nowait`
   /// unset, the WAITING flag is set first so the holder knows to unpark us.
   #[inline]
   fn enter_step(&self, nowait: bool) -> Result<Entry<'_>, u16> {
      loop {
         let current_state = self.0.load(Ordering::Acquire);
         if current_state & Self::DONE != 0 {
            return Ok(Entry::Done);
         }
         if current_state & Self::POISONED != 0 {
            return Ok(Entry::Poisoned);
         }

         if current_state & Self::LOCKED == 0 {
            match self.0.compare_exchange_weak(
               current_state,
               current_state | Self::LOCKED,
               Ordering::Acquire,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Ok(Entry::Locked(InitGuard::new(self))),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }

         if !nowait && current_state & Self::WAITING == 0 {
            let new_state = current_state | Self::WAITING;
            match self.0.compare_exchange_weak(
               current_state,
               new_state,
               Ordering::Relaxed,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Err(new_state),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }
         return Err(current_state);
      }
   }

   /// Enters the gate, parking while another thread runs the factory.
   #[inline]
   pub(crate) fn enter(&self) -> Entry<'_> {
      let mut observed = match self.enter_step(false) {
         Ok(entry) => return entry,
         Err(state) => state,
      };
      loop {
         self.wait(observed);
         match self.enter_step(false) {
            Ok(entry) => return entry,
            Err(state) => observed = state,
         }
      }
   }

   /// Enters the gate from async code.
   ///
   /// Yields to the runtime while the lock is held. On the multi-threaded
   /// runtime it eventually falls back to parking inside `block_in_place`;
   /// any other runtime flavor keeps yielding, since `block_in_place` panics there.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn enter_async(&self) -> Entry<'_> {
      loop {
         for _ in 0..16 {
            match self.enter_step(false) {
               Ok(entry) => return entry,
               Err(state) => {
                  for _ in 0..32 {
                     tokio::task::yield_now().await;
                     if self.0.load(Ordering::Relaxed) != state {
                        break;
                     }
                  }
               }
            }
         }

         #[cfg(feature = "async-tokio-mt")]
         {
            if on_multi_thread_runtime() {
               return match self.enter_step(false) {
                  Ok(entry) => entry,
                  Err(state) => tokio::task::block_in_place(|| {
                     self.wait(state);
                     self.enter()
                  }),
               };
            }
         }
      }
   }

   /// Enters the gate only if nobody holds it right now.
   ///
   /// Used by the `&mut self` paths, where contention is impossible.
   #[inline]
   pub(crate) fn try_enter(&self) -> Option<Entry<'_>> {
      self.enter_step(true).ok()
   }
}

/// Exclusive right to run the factory.
///
/// Dropping the guard without calling [`commit`](Self::commit) or
/// [`reset`](Self::reset) means the factory unwound, and the gate is poisoned.
pub(crate) struct InitGuard<'a> {
   gate: &'a InitGate,
}

impl<'a> InitGuard<'a> {
   #[inline(always)]
   const fn new(gate: &'a InitGate) -> Self {
      Self { gate }
   }

   /// Publishes the constructed value and wakes waiters.
   #[inline(always)]
   pub(crate) fn commit(self) {
      self.gate.release(InitGate::DONE);
      mem::forget(self);
   }

   /// Gives up this attempt and lets the next caller retry.
   #[inline(always)]
   pub(crate) fn reset(self) {
      self.gate.release(0);
      mem::forget(self);
   }
}

impl Drop for InitGuard<'_> {
   #[inline(always)]
   fn drop(&mut self) {
      self.gate.release(InitGate::POISONED);
   }
}

/// Whether the current task runs on a runtime where `block_in_place` is allowed.
#[cfg(feature = "async-tokio-mt")]
fn on_multi_thread_runtime() -> bool {
   use tokio::runtime::{Handle, RuntimeFlavor};

   matches!(
      Handle::try_current().map(|handle| handle.runtime_flavor()),
      Ok(RuntimeFlavor::MultiThread)
   )
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_epoch_keeps_flags_and_wraps_after_4096_releases() {
      let gate = InitGate::new();
      let start = gate.0.load(Ordering::Relaxed) & InitGate::EPOCH_MASK;

      for i in 1..4096 {
         gate.release(0);
         let state = gate.0.load(Ordering::Relaxed);
         assert_eq!(state & !InitGate::EPOCH_MASK, 0);
         assert_ne!(state & InitGate::EPOCH_MASK, start, "epoch repeated after {i} releases");
      }
      gate.release(0);
      assert_eq!(gate.0.load(Ordering::Relaxed) & InitGate::EPOCH_MASK, start);
   }

   #[test]
   fn test_release_sets_terminal_flags() {
      let gate = InitGate::new();
      gate.release(InitGate::POISONED);
      assert!(gate.is_poisoned(Ordering::Relaxed));
      assert!(!gate.is_done(Ordering::Relaxed));
      assert!(matches!(gate.enter(), Entry::Poisoned));

      let gate = InitGate::new();
      match gate.enter() {
         Entry::Locked(guard) => guard.commit(),
         _ => panic!("fresh gate must be enterable"),
      }
      assert!(matches!(gate.enter(), Entry::Done));
   }
}
