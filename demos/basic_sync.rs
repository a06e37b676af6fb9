use std::sync::atomic::{AtomicUsize, Ordering};

use lazy_holder::Lazy;

static COUNTER: AtomicUsize = AtomicUsize::new(0);
static DATA: Lazy<String> = Lazy::new(|| {
   // This closure runs only once
   COUNTER.fetch_add(1, Ordering::Relaxed);
   println!("Initializing data...");
   // Simulate work
   std::thread::sleep(std::time::Duration::from_millis(50));
   "Expensive data".to_string()
});

fn main() {
   println!("Created before threads start: {}", DATA.value_created());

   let threads: Vec<_> = (0..5)
      .map(|_| {
         std::thread::spawn(|| {
            println!("Thread access: {}", DATA.access());
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   assert!(DATA.value_created());
   assert_eq!(COUNTER.load(Ordering::Relaxed), 1); // Factory ran only once
   println!("Final data: {}", *DATA);
}
