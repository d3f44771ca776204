//! Doubly linked chain of leaf pages in key order.
//!
//! Each leaf carries weak `prev`/`next` links to its neighbours. The links
//! never own the page they point to: leaves are owned by their parent (or by
//! the tree, for a leaf root), and a leaf is unlinked from the chain before it
//! is retired.
//!
//! All links are read and written under one tree-wide lock. That lock is
//! always the innermost one: it is taken while holding at most page latches,
//! and nothing waits for a page latch while holding it.

use crossbeam_epoch::{Atomic, Guard, Shared};

use std::sync::atomic::Ordering;

use crate::page::Page;
use crate::sync::RwLock;

/// Weak neighbour links of a leaf page.
pub(crate) struct LeafLinks<V> {
	prev: Atomic<Page<V>>,
	next: Atomic<Page<V>>,
}

impl<V> Default for LeafLinks<V> {
	fn default() -> Self {
		LeafLinks {
			prev: Atomic::null(),
			next: Atomic::null(),
		}
	}
}

/// The tree-wide leaf-chain lock.
pub(crate) struct LeafChain {
	lock: RwLock<()>,
}

impl LeafChain {
	pub(crate) fn new() -> LeafChain {
		LeafChain {
			lock: RwLock::new(()),
		}
	}

	/// Links `right` into the chain directly after `left`.
	///
	/// `right` must be a fresh page that no other thread can reach yet.
	pub(crate) fn splice_after<V>(&self, left: &Page<V>, right: Shared<'_, Page<V>>, guard: &Guard) {
		let _lock = self.lock.write();
		// SAFETY: `right` was just allocated by the caller.
		let right_page = unsafe { right.deref() };
		let next = left.links.next.load(Ordering::Relaxed, guard);
		right_page.links.prev.store(Shared::from(left as *const Page<V>), Ordering::Relaxed);
		right_page.links.next.store(next, Ordering::Relaxed);
		// SAFETY: linked leaves are live while the chain lock is held.
		if let Some(next) = unsafe { next.as_ref() } {
			next.links.prev.store(right, Ordering::Relaxed);
		}
		left.links.next.store(right, Ordering::Release);
	}

	/// Removes `page` from the chain, joining its neighbours.
	pub(crate) fn unlink<V>(&self, page: &Page<V>, guard: &Guard) {
		let _lock = self.lock.write();
		let prev = page.links.prev.load(Ordering::Relaxed, guard);
		let next = page.links.next.load(Ordering::Relaxed, guard);
		// SAFETY: linked leaves are live while the chain lock is held.
		unsafe {
			if let Some(prev) = prev.as_ref() {
				prev.links.next.store(next, Ordering::Release);
			}
			if let Some(next) = next.as_ref() {
				next.links.prev.store(prev, Ordering::Relaxed);
			}
		}
		page.links.prev.store(Shared::null(), Ordering::Relaxed);
		page.links.next.store(Shared::null(), Ordering::Relaxed);
	}

	/// Reads the successor of `page`.
	///
	/// The caller must hold `page`'s latch, so that `page` cannot be retired
	/// while the link is read.
	pub(crate) fn next<'g, V>(&self, page: &Page<V>, guard: &'g Guard) -> Shared<'g, Page<V>> {
		let _lock = self.lock.read();
		page.links.next.load(Ordering::Acquire, guard)
	}

	/// Reads the predecessor of `page`. Same contract as [`LeafChain::next`].
	pub(crate) fn prev<'g, V>(&self, page: &Page<V>, guard: &'g Guard) -> Shared<'g, Page<V>> {
		let _lock = self.lock.read();
		page.links.prev.load(Ordering::Acquire, guard)
	}
}
