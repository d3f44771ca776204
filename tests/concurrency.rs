//! # Concurrency Tests for Crabtree
//!
//! Multi-threaded tests that verify the latch-coupling protocol under
//! contention. Every scenario runs inside [`run_with_timeout`], so a lock
//! ordering bug shows up as a failed test instead of a hung test run.
//!
//! ## Test Categories
//!
//! - Basic concurrent tests: low contention, always run
//! - Stress tests: higher contention, marked with `#[ignore]` - run with
//!   `cargo test -- --ignored`

#![cfg(not(loom))]

use crabtree::{Error, Tree};
use rand::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(60);

// ===========================================================================
// Timeout Helper
// ===========================================================================

/// Runs a closure on its own thread, panicking if it does not complete
/// within `timeout`.
///
/// # Panics
///
/// Panics on timeout (a likely deadlock), or if the closure panicked.
fn run_with_timeout<F, R>(timeout: Duration, name: &str, f: F) -> R
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let (tx, rx) = channel();
	let handle = thread::spawn(move || {
		let result = f();
		let _ = tx.send(result);
	});

	match rx.recv_timeout(timeout) {
		Ok(result) => {
			handle.join().expect("Thread panicked");
			result
		}
		Err(RecvTimeoutError::Timeout) => {
			panic!("TIMEOUT: '{}' did not complete within {:?} - potential deadlock detected", name, timeout);
		}
		Err(RecvTimeoutError::Disconnected) => {
			handle.join().expect("Thread panicked without sending result");
			panic!("Thread terminated unexpectedly without completing");
		}
	}
}

/// Spawns `threads` workers running `f(thread_index)` and joins them all.
fn spawn_workers<F>(threads: usize, f: F)
where
	F: Fn(usize) + Send + Sync + 'static,
{
	let f = Arc::new(f);
	let handles: Vec<_> = (0..threads)
		.map(|t| {
			let f = Arc::clone(&f);
			thread::spawn(move || f(t))
		})
		.collect();
	for h in handles {
		h.join().unwrap();
	}
}

// ===========================================================================
// Basic Concurrent Insert Tests
// ===========================================================================

#[test]
fn concurrent_insert_disjoint_ranges() {
	run_with_timeout(TIMEOUT, "concurrent_insert_disjoint_ranges", || {
		let tree = Arc::new(Tree::with_degree(4).unwrap());
		let threads = 4;
		let per_thread = 1000u64;

		let t2 = Arc::clone(&tree);
		spawn_workers(threads, move |t| {
			let base = t as u64 * per_thread;
			for i in 0..per_thread {
				t2.insert(base + i, (base + i) * 10).unwrap();
			}
		});

		tree.assert_invariants();
		assert_eq!(tree.len(), threads * per_thread as usize);
		for key in 0..threads as u64 * per_thread {
			assert_eq!(tree.lookup(key), Ok(key * 10), "Missing key {}", key);
		}
	});
}

#[test]
fn concurrent_insert_interleaved_keys() {
	run_with_timeout(TIMEOUT, "concurrent_insert_interleaved_keys", || {
		let tree = Arc::new(Tree::with_degree(3).unwrap());
		let threads = 8;

		let t2 = Arc::clone(&tree);
		spawn_workers(threads, move |t| {
			// Thread t owns every key congruent to t, so all threads hit the
			// same leaves and split them against each other.
			for i in 0..500u64 {
				let key = i * threads as u64 + t as u64;
				t2.insert(key, key).unwrap();
			}
		});

		tree.assert_invariants();
		assert_eq!(tree.range(0, 5000), (0..4000).collect::<Vec<_>>());
	});
}

/// Each key is contested by every thread; exactly one insert must win.
#[test]
fn concurrent_duplicate_inserts() {
	run_with_timeout(TIMEOUT, "concurrent_duplicate_inserts", || {
		let tree = Arc::new(Tree::with_degree(4).unwrap());
		let wins = Arc::new(AtomicUsize::new(0));
		let keys = 500u64;

		let (t2, w2) = (Arc::clone(&tree), Arc::clone(&wins));
		spawn_workers(6, move |t| {
			for key in 0..keys {
				match t2.insert(key, t as u64) {
					Ok(()) => {
						w2.fetch_add(1, Ordering::Relaxed);
					}
					Err(e) => assert_eq!(e, Error::AlreadyExists(key)),
				}
			}
		});

		assert_eq!(wins.load(Ordering::Relaxed), keys as usize);
		assert_eq!(tree.len(), keys as usize);
		tree.assert_invariants();
	});
}

// ===========================================================================
// Phased Workload
// ===========================================================================

/// Disjoint inserts, then lookups, then removes, with a barrier between
/// phases so every thread observes the other threads' completed work.
#[test]
fn phased_insert_lookup_remove() {
	run_with_timeout(TIMEOUT, "phased_insert_lookup_remove", || {
		let threads = 4;
		let per_thread = 2000u64;
		let tree = Arc::new(Tree::with_degree(5).unwrap());
		let barrier = Arc::new(Barrier::new(threads));

		let (t2, b2) = (Arc::clone(&tree), Arc::clone(&barrier));
		spawn_workers(threads, move |t| {
			let mine = t as u64 * per_thread..(t as u64 + 1) * per_thread;
			let all = 0..threads as u64 * per_thread;

			for key in mine.clone() {
				t2.insert(key, key + 1).unwrap();
			}
			b2.wait();

			for key in all.clone() {
				assert_eq!(t2.lookup(key), Ok(key + 1), "key {} missing after insert phase", key);
			}
			b2.wait();

			for key in mine {
				assert_eq!(t2.remove(key), Ok(key + 1));
			}
			b2.wait();

			for key in all {
				assert_eq!(t2.lookup(key), Err(Error::NotFound(key)));
			}
		});

		tree.assert_invariants();
		assert!(tree.is_empty());
		assert_eq!(tree.height(), 1);
		assert_eq!(tree.stats().live_pages, 1);
	});
}

// ===========================================================================
// Readers and Writers
// ===========================================================================

#[test]
fn many_concurrent_readers() {
	run_with_timeout(TIMEOUT, "many_concurrent_readers", || {
		let tree = Arc::new(Tree::with_degree(8).unwrap());
		for key in 0..5000u64 {
			tree.insert(key, key * 2).unwrap();
		}

		let t2 = Arc::clone(&tree);
		spawn_workers(8, move |t| {
			let mut rng = StdRng::seed_from_u64(t as u64);
			for _ in 0..5000 {
				let key = rng.random_range(0..5000u64);
				assert_eq!(t2.lookup(key), Ok(key * 2));
			}
			let scan = t2.range(t as u64 * 100, 50);
			assert_eq!(scan, (t as u64 * 100..t as u64 * 100 + 50).map(|k| k * 2).collect::<Vec<_>>());
		});
	});
}

/// Writers churn one key space while readers scan it. Every scan must be
/// strictly ascending, and the permanent keys must always be seen.
#[test]
fn scans_stay_sorted_during_splits_and_merges() {
	run_with_timeout(TIMEOUT, "scans_stay_sorted_during_splits_and_merges", || {
		let tree = Arc::new(Tree::with_degree(3).unwrap());
		// Multiples of 10 are never touched by the writers.
		for key in (0..2000u64).step_by(10) {
			tree.insert(key, key).unwrap();
		}
		let done = Arc::new(AtomicBool::new(false));

		let writers: Vec<_> = (0..3u64)
			.map(|t| {
				let tree = Arc::clone(&tree);
				thread::spawn(move || {
					let mut rng = StdRng::seed_from_u64(t);
					for _ in 0..20_000 {
						let key = rng.random_range(0..2000u64);
						if key % 10 == 0 {
							continue;
						}
						if rng.random_bool(0.5) {
							let _ = tree.insert(key, key);
						} else {
							let _ = tree.remove(key);
						}
					}
				})
			})
			.collect();

		let readers: Vec<_> = (0..3)
			.map(|_| {
				let tree = Arc::clone(&tree);
				let done = Arc::clone(&done);
				thread::spawn(move || {
					let mut scans = 0;
					while !done.load(Ordering::Relaxed) || scans == 0 {
						let entries: Vec<(u64, u64)> = tree.range_iter(0).collect();
						assert!(entries.windows(2).all(|w| w[0].0 < w[1].0), "scan out of order");
						assert!(entries.iter().all(|(k, v)| k == v));
						let stable: Vec<u64> =
							entries.iter().map(|(k, _)| *k).filter(|k| k % 10 == 0).collect();
						assert_eq!(stable, (0..2000).step_by(10).collect::<Vec<u64>>());
						scans += 1;
					}
				})
			})
			.collect();

		for w in writers {
			w.join().unwrap();
		}
		done.store(true, Ordering::Relaxed);
		for r in readers {
			r.join().unwrap();
		}

		tree.assert_invariants();
	});
}

#[test]
fn concurrent_insert_and_lookup() {
	run_with_timeout(TIMEOUT, "concurrent_insert_and_lookup", || {
		let tree = Arc::new(Tree::with_degree(4).unwrap());
		let inserted = Arc::new(AtomicUsize::new(0));

		let writer = {
			let tree = Arc::clone(&tree);
			let inserted = Arc::clone(&inserted);
			thread::spawn(move || {
				for key in 0..5000u64 {
					tree.insert(key, key).unwrap();
					inserted.store(key as usize + 1, Ordering::Release);
				}
			})
		};

		let readers: Vec<_> = (0..4)
			.map(|_| {
				let tree = Arc::clone(&tree);
				let inserted = Arc::clone(&inserted);
				thread::spawn(move || {
					let mut rng = rand::rng();
					while inserted.load(Ordering::Acquire) < 5000 {
						let upto = inserted.load(Ordering::Acquire) as u64;
						if upto == 0 {
							continue;
						}
						// Anything published before the load must be visible.
						let key = rng.random_range(0..upto);
						assert_eq!(tree.lookup(key), Ok(key));
					}
				})
			})
			.collect();

		writer.join().unwrap();
		for r in readers {
			r.join().unwrap();
		}
		tree.assert_invariants();
	});
}

// ===========================================================================
// Delete Contention
// ===========================================================================

#[test]
fn concurrent_removes_disjoint() {
	run_with_timeout(TIMEOUT, "concurrent_removes_disjoint", || {
		let tree = Arc::new(Tree::with_degree(3).unwrap());
		for key in 0..8000u64 {
			tree.insert(key, key).unwrap();
		}

		let t2 = Arc::clone(&tree);
		spawn_workers(4, move |t| {
			// Remove everything except every fourth key owned by this thread.
			for key in (t as u64..8000).step_by(4) {
				if key % 16 != t as u64 {
					assert_eq!(t2.remove(key), Ok(key));
				}
			}
		});

		tree.assert_invariants();
		let left: Vec<u64> = tree.range(0, 10_000);
		let want: Vec<u64> = (0..8000).filter(|k| k % 16 == k % 4).collect();
		assert_eq!(left, want);
	});
}

/// Every thread tries to remove every key; each removal succeeds exactly once.
#[test]
fn concurrent_removes_contended() {
	run_with_timeout(TIMEOUT, "concurrent_removes_contended", || {
		let tree = Arc::new(Tree::with_degree(4).unwrap());
		let keys = 3000u64;
		for key in 0..keys {
			tree.insert(key, key).unwrap();
		}
		let removed = Arc::new(AtomicUsize::new(0));

		let (t2, r2) = (Arc::clone(&tree), Arc::clone(&removed));
		spawn_workers(4, move |t| {
			let mut order: Vec<u64> = (0..keys).collect();
			order.shuffle(&mut StdRng::seed_from_u64(t as u64));
			for key in order {
				if t2.remove(key).is_ok() {
					r2.fetch_add(1, Ordering::Relaxed);
				}
			}
		});

		assert_eq!(removed.load(Ordering::Relaxed), keys as usize);
		assert!(tree.is_empty());
		assert_eq!(tree.height(), 1);
		tree.assert_invariants();
	});
}

#[test]
fn concurrent_mixed_operations_match_final_state() {
	run_with_timeout(TIMEOUT, "concurrent_mixed_operations_match_final_state", || {
		let tree = Arc::new(Tree::with_degree(4).unwrap());
		let threads = 4u64;

		// Each thread owns a residue class, so it can track its own keys
		// exactly while still sharing leaves with every other thread.
		let handles: Vec<_> = (0..threads)
			.map(|t| {
				let tree = Arc::clone(&tree);
				thread::spawn(move || {
					let mut rng = StdRng::seed_from_u64(100 + t);
					let mut mine = BTreeSet::new();
					for _ in 0..10_000 {
						let key = rng.random_range(0..1000u64) * threads + t;
						if rng.random_bool(0.6) {
							assert_eq!(tree.insert(key, key).is_ok(), mine.insert(key));
						} else {
							assert_eq!(tree.remove(key).is_ok(), mine.remove(&key));
						}
					}
					mine
				})
			})
			.collect();

		let mut expected = BTreeSet::new();
		for h in handles {
			expected.extend(h.join().unwrap());
		}

		tree.assert_invariants();
		let keys: Vec<u64> = tree.range_iter(0).map(|(k, _)| k).collect();
		assert_eq!(keys, expected.into_iter().collect::<Vec<_>>());
	});
}

// ===========================================================================
// Stress Tests (ignored by default - run with `cargo test -- --ignored`)
// ===========================================================================

/// Rapid split/merge cycles over a small key range with many threads.
#[test]
#[ignore]
fn stress_split_merge_cycles() {
	run_with_timeout(Duration::from_secs(300), "stress_split_merge_cycles", || {
		let tree = Arc::new(Tree::with_degree(3).unwrap());
		let t2 = Arc::clone(&tree);
		spawn_workers(16, move |t| {
			let mut rng = StdRng::seed_from_u64(t as u64);
			for _ in 0..200_000 {
				let key = rng.random_range(0..256u64);
				match rng.random_range(0..4) {
					0 | 1 => {
						let _ = t2.insert(key, key);
					}
					2 => {
						let _ = t2.remove(key);
					}
					_ => {
						let scan: Vec<u64> = t2.range(key, 16);
						assert!(scan.windows(2).all(|w| w[0] < w[1]));
					}
				}
			}
		});
		tree.assert_invariants();
		tree.emit_stats();
	});
}

#[test]
#[ignore]
fn stress_large_scale_concurrent_inserts() {
	run_with_timeout(Duration::from_secs(300), "stress_large_scale_concurrent_inserts", || {
		let tree = Arc::new(Tree::new());
		let t2 = Arc::clone(&tree);
		spawn_workers(8, move |t| {
			let mut keys: Vec<u64> = (0..100_000).map(|i| i * 8 + t as u64).collect();
			keys.shuffle(&mut rand::rng());
			for key in keys {
				t2.insert(key, key).unwrap();
			}
		});
		tree.assert_invariants();
		assert_eq!(tree.len(), 800_000);
	});
}
