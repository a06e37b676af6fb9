use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lazy_holder::Lazy;

static COUNTER: AtomicUsize = AtomicUsize::new(0);
static SHARED: Lazy<Vec<u64>> = Lazy::new(|| {
   // Runs on whichever task wins; the others yield until it is done
   COUNTER.fetch_add(1, Ordering::Relaxed);
   println!("Building lookup table...");
   std::thread::sleep(Duration::from_millis(50));
   (0..1024).map(|i| i * i).collect()
});

#[tokio::main]
async fn main() {
   let tasks: Vec<_> = (0..5)
      .map(|i| {
         tokio::spawn(async move {
            let table = SHARED.access_async().await;
            println!("Task {i} sees table[{i}] = {}", table[i]);
         })
      })
      .collect();

   for t in tasks {
      t.await.unwrap();
   }

   assert_eq!(COUNTER.load(Ordering::Relaxed), 1); // Factory ran only once
   println!("Table length: {}", SHARED.access_async().await.len());
}
