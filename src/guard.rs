//! Call-scoped reentry guards

use std::sync::atomic::{AtomicBool, Ordering};

/// A flag marking that an operation is currently on the call stack.
///
/// `enter()` hands back an RAII scope whose drop clears the flag, so the
/// clear-on-every-exit-path contract is structural rather than a convention
/// each error path has to remember. A nested `enter()` returns `None`,
/// letting the inner call detect the recursion and short-circuit.
#[derive(Debug, Default)]
pub(crate) struct ReentryFlag {
   set: AtomicBool,
}

impl ReentryFlag {
   /// Whether an outer call currently holds the flag.
   pub(crate) fn is_set(&self) -> bool {
      self.set.load(Ordering::SeqCst)
   }

   /// Take the flag for the duration of the returned scope.
   ///
   /// `None` when the flag is already held further up the stack.
   pub(crate) fn enter(&self) -> Option<ReentryScope<'_>> {
      if self.set.swap(true, Ordering::SeqCst) {
         return None;
      }
      Some(ReentryScope { flag: self })
   }
}

/// RAII scope clearing its [`ReentryFlag`] on drop.
#[derive(Debug)]
pub(crate) struct ReentryScope<'a> {
   flag: &'a ReentryFlag,
}

impl Drop for ReentryScope<'_> {
   fn drop(&mut self) {
      self.flag.set.store(false, Ordering::SeqCst);
   }
}
