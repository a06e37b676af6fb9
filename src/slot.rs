//! Storage shared by the lazy holders: the pending factory or the constructed
//! value, never both.
//!
//! The slot has no discriminant of its own. Which field is live is decided by
//! the owning holder's [`InitGate`](crate::state::InitGate), and every accessor
//! is `unsafe` for that reason.

use core::mem::ManuallyDrop;

pub(crate) union Slot<F, T> {
   factory: ManuallyDrop<F>,
   value: ManuallyDrop<T>,
}

impl<F, T> Slot<F, T> {
   #[inline(always)]
   pub(crate) const fn pending(factory: F) -> Self {
      Self {
         factory: ManuallyDrop::new(factory),
      }
   }

   #[inline(always)]
   pub(crate) const fn ready(value: T) -> Self {
      Self {
         value: ManuallyDrop::new(value),
      }
   }

   /// Moves the factory out, leaving the slot with no live field.
   ///
   /// # Safety
   ///
   /// The factory must be live.
   #[inline(always)]
   pub(crate) unsafe fn take_factory(&mut self) -> F {
      unsafe { ManuallyDrop::take(&mut self.factory) }
   }

   /// # Safety
   ///
   /// The factory must be live.
   #[inline(always)]
   pub(crate) unsafe fn factory_mut(&mut self) -> &mut F {
      unsafe { &mut self.factory }
   }

   /// # Safety
   ///
   /// The factory must be live.
   #[inline(always)]
   pub(crate) unsafe fn drop_factory(&mut self) {
      unsafe { ManuallyDrop::drop(&mut self.factory) }
   }

   /// Stores `value` without dropping whatever the slot held before.
   ///
   /// # Safety
   ///
   /// The caller must have moved out or dropped the previous field, and must
   /// have exclusive access to the slot.
   #[inline(always)]
   pub(crate) unsafe fn write_value(&mut self, value: T) -> &mut T {
      *self = Self::ready(value);
      unsafe { &mut self.value }
   }

   /// # Safety
   ///
   /// The value must be live.
   #[inline(always)]
   pub(crate) unsafe fn value(&self) -> &T {
      unsafe { &self.value }
   }

   /// # Safety
   ///
   /// The value must be live.
   #[inline(always)]
   pub(crate) unsafe fn value_mut(&mut self) -> &mut T {
      unsafe { &mut self.value }
   }

   /// # Safety
   ///
   /// The value must be live.
   #[inline(always)]
   pub(crate) unsafe fn take_value(&mut self) -> T {
      unsafe { ManuallyDrop::take(&mut self.value) }
   }

   /// # Safety
   ///
   /// The value must be live.
   #[inline(always)]
   pub(crate) unsafe fn drop_value(&mut self) {
      unsafe { ManuallyDrop::drop(&mut self.value) }
   }
}
