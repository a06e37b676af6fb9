use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use lazy_holder::{Lazy, PoisonError, TryLazy};

static FAIL: AtomicBool = AtomicBool::new(true);
static MAYBE_DATA: TryLazy<String, &'static str> = TryLazy::new(|| {
   let fail = FAIL.load(Ordering::Relaxed);
   println!("Attempting initialization (fail={fail})...");
   if fail {
      Err("Initialization failed!")
   } else {
      Ok("Successfully initialized".to_string())
   }
});

fn main() {
   // First attempt fails, and the holder stays empty
   match MAYBE_DATA.try_access() {
      Ok(_) => panic!("Should have failed"),
      Err(e) => println!("Caught error: {e}"),
   }
   assert!(!MAYBE_DATA.value_created());

   // Second attempt retries the factory and succeeds
   FAIL.store(false, Ordering::Relaxed);
   match MAYBE_DATA.try_access() {
      Ok(data) => println!("Got data: {data}"),
      Err(_) => panic!("Should have succeeded"),
   }
   assert!(MAYBE_DATA.value_created());

   // Later failures in the environment no longer matter
   FAIL.store(true, Ordering::Relaxed);
   assert_eq!(
      MAYBE_DATA.try_access(),
      Ok(&"Successfully initialized".to_string())
   );

   // A panicking factory, by contrast, poisons its holder for good
   let broken: Lazy<String> = Lazy::new(|| panic!("no config found"));
   let _ = panic::catch_unwind(AssertUnwindSafe(|| broken.access().len()));
   assert_eq!(broken.try_access(), Err(PoisonError));
   println!("Poisoned holder: {broken:?}");
}
