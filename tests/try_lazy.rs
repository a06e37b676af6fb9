use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use lazy_holder::TryLazy;

#[test]
fn test_new_is_not_created() {
   let lazy: TryLazy<i32, &str> = TryLazy::new(|| Ok(1));
   assert!(!lazy.value_created());
   assert_eq!(lazy.get(), None);
}

#[test]
fn test_with_value_is_created() {
   let lazy = TryLazy::<i32, &str>::with_value(42);
   assert!(lazy.value_created());
   assert_eq!(lazy.try_access(), Ok(&42));
}

#[test]
fn test_try_access_runs_once() {
   let calls = AtomicUsize::new(0);
   let lazy: TryLazy<i32, &str, _> = TryLazy::new(|| {
      calls.fetch_add(1, Ordering::SeqCst);
      Ok(42)
   });

   assert_eq!(lazy.try_access(), Ok(&42));
   assert_eq!(lazy.try_access(), Ok(&42));
   assert!(lazy.value_created());
   assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_error_then_retry() {
   let mut attempts = 0;
   let lazy: TryLazy<String, String, _> = TryLazy::new(|| {
      attempts += 1;
      if attempts == 1 {
         Err(format!("attempt {attempts} failed"))
      } else {
         Ok(format!("attempt {attempts} ok"))
      }
   });

   assert_eq!(lazy.try_access(), Err(String::from("attempt 1 failed")));
   assert!(!lazy.value_created());
   assert!(!lazy.is_poisoned());
   assert_eq!(lazy.get(), None);

   assert_eq!(lazy.try_access().map(String::as_str), Ok("attempt 2 ok"));
   assert_eq!(lazy.try_access().map(String::as_str), Ok("attempt 2 ok"));
   assert!(lazy.value_created());
}

#[test]
fn test_concurrent_failures_are_retried() {
   let calls = Arc::new(AtomicUsize::new(0));
   let lazy: Arc<TryLazy<usize, usize, _>> = Arc::new(TryLazy::new({
      let calls = Arc::clone(&calls);
      move || {
         let n = calls.fetch_add(1, Ordering::SeqCst);
         thread::sleep(Duration::from_millis(10));
         if n < 3 {
            Err(n)
         } else {
            Ok(n * 10)
         }
      }
   }));
   let start = Arc::new(Barrier::new(8));

   let threads: Vec<_> = (0..8)
      .map(|_| {
         let lazy = Arc::clone(&lazy);
         let start = Arc::clone(&start);
         thread::spawn(move || {
            start.wait();
            lazy.try_access().copied()
         })
      })
      .collect();

   let results: Vec<_> = threads.into_iter().map(|h| h.join().unwrap()).collect();
   let mut errors: Vec<usize> = results.iter().filter_map(|r| r.err()).collect();
   errors.sort_unstable();

   // Each failed attempt reaches exactly one caller; everyone else sees the value.
   assert_eq!(errors, vec![0, 1, 2]);
   assert!(results.iter().filter_map(|r| r.ok()).all(|v| v == 30));
   assert_eq!(calls.load(Ordering::SeqCst), 4);
   assert_eq!(lazy.get(), Some(&30));
}

#[test]
fn test_try_access_mut() {
   let mut fail = true;
   let mut lazy: TryLazy<Vec<i32>, &str, _> = TryLazy::new(|| {
      if std::mem::take(&mut fail) {
         Err("not yet")
      } else {
         Ok(vec![1])
      }
   });

   assert_eq!(lazy.try_access_mut(), Err("not yet"));
   assert!(!lazy.value_created());

   lazy.try_access_mut().unwrap().push(2);
   assert_eq!(lazy.get(), Some(&vec![1, 2]));
   lazy.get_mut().unwrap().push(3);
   assert_eq!(lazy.try_access(), Ok(&vec![1, 2, 3]));
}

#[test]
fn test_panic_poisons() {
   let lazy: TryLazy<i32, ()> = TryLazy::new(|| panic!("factory failed"));

   let result = panic::catch_unwind(AssertUnwindSafe(|| lazy.try_access().copied()));
   assert!(result.is_err());
   assert!(lazy.is_poisoned());
   assert_eq!(format!("{lazy:?}"), "TryLazy(<poisoned>)");
}

#[test]
#[should_panic(expected = "poisoned")]
fn test_access_after_poison_panics() {
   let lazy: TryLazy<i32, ()> = TryLazy::new(|| panic!("factory failed"));
   let _ = panic::catch_unwind(AssertUnwindSafe(|| lazy.try_access().copied()));
   let _ = lazy.try_access();
}

#[test]
fn test_into_inner() {
   let lazy: TryLazy<i32, ()> = TryLazy::new(|| Ok(3));
   let factory = lazy.into_inner().unwrap_err();
   assert_eq!(factory(), Ok(3));

   let lazy: TryLazy<i32, ()> = TryLazy::new(|| Ok(3));
   lazy.try_access().unwrap();
   assert_eq!(lazy.into_inner().ok(), Some(3));
}

#[test]
fn test_debug() {
   let lazy: TryLazy<i32, ()> = TryLazy::new(|| Ok(8));
   assert_eq!(format!("{lazy:?}"), "TryLazy(<uninit>)");
   lazy.try_access().unwrap();
   assert_eq!(format!("{lazy:?}"), "TryLazy(8)");
}

// ===== Drop behavior =====

#[test]
fn test_factory_kept_after_error() {
   let captured = Arc::new(0u32);
   let witness = Arc::clone(&captured);
   let mut first = true;

   let lazy: TryLazy<u32, &str, _> = TryLazy::new(move || {
      if std::mem::take(&mut first) {
         Err("first call fails")
      } else {
         Ok(*captured + 5)
      }
   });

   assert!(lazy.try_access().is_err());
   assert_eq!(Arc::strong_count(&witness), 2);

   assert_eq!(lazy.try_access(), Ok(&5));
   assert_eq!(Arc::strong_count(&witness), 1);
}

#[test]
fn test_poisoned_factory_dropped_with_holder() {
   let captured = Arc::new(0u32);
   let witness = Arc::clone(&captured);
   {
      let lazy: TryLazy<u32, (), _> = TryLazy::new(move || -> Result<u32, ()> {
         assert_eq!(*captured, 0);
         panic!("factory failed")
      });
      let _ = panic::catch_unwind(AssertUnwindSafe(|| lazy.try_access().copied()));
      assert!(lazy.is_poisoned());
      assert_eq!(Arc::strong_count(&witness), 2);
   }
   assert_eq!(Arc::strong_count(&witness), 1);
}

// ===== Async =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_try_access_async() {
   let calls = Arc::new(AtomicUsize::new(0));
   let lazy: Arc<TryLazy<usize, usize, _>> = Arc::new(TryLazy::new({
      let calls = Arc::clone(&calls);
      move || {
         let n = calls.fetch_add(1, Ordering::SeqCst);
         thread::sleep(Duration::from_millis(10));
         if n == 0 {
            Err(n)
         } else {
            Ok(n)
         }
      }
   }));

   assert_eq!(lazy.try_access_async().await, Err(0));

   let tasks: Vec<_> = (0..6)
      .map(|_| {
         let lazy = Arc::clone(&lazy);
         tokio::spawn(async move { lazy.try_access_async().await.copied() })
      })
      .collect();

   for task in tasks {
      assert_eq!(task.await.unwrap(), Ok(1));
   }
   assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_try_access_async_current_thread_waits_for_builder_thread() {
   let inside = Arc::new(Barrier::new(2));
   let lazy: Arc<TryLazy<u32, &str, _>> = Arc::new(TryLazy::new({
      let inside = Arc::clone(&inside);
      move || {
         inside.wait();
         thread::sleep(Duration::from_millis(300));
         Ok(11u32)
      }
   }));

   let builder = {
      let lazy = Arc::clone(&lazy);
      thread::spawn(move || lazy.try_access().copied())
   };

   inside.wait();
   assert_eq!(lazy.try_access_async().await, Ok(&11));
   assert_eq!(builder.join().unwrap(), Ok(11));
}

