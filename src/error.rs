//! Errors reported by the lazy holders.

use thiserror::Error;

/// The factory of a lazy holder panicked, so the holder can never produce a value.
///
/// Returned by [`Lazy::try_access`](crate::Lazy::try_access). The plain access
/// methods panic with this error's message instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Lazy instance has previously been poisoned")]
pub struct PoisonError;

#[cold]
#[track_caller]
pub(crate) fn poisoned() -> ! {
   panic!("{}", PoisonError)
}
