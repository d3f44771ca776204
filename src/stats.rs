//! Counters for structural changes.
//!
//! Every split, merge, borrow and root replacement bumps a relaxed atomic
//! counter. `live_pages` tracks pages reachable from the root: it grows on
//! every allocation and shrinks when a merge or root collapse retires a page.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of tree statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
	/// Number of leaf page splits performed
	pub leaf_splits: u64,
	/// Number of internal page splits performed
	pub internal_splits: u64,
	/// Number of leaf page merges performed
	pub leaf_merges: u64,
	/// Number of internal page merges performed
	pub internal_merges: u64,
	/// Number of single-entry borrows from a sibling
	pub borrows: u64,
	/// Number of times the root split and the tree grew a level
	pub root_splits: u64,
	/// Number of times the root was replaced by its only child
	pub root_collapses: u64,
	/// Pages currently reachable from the root
	pub live_pages: u64,
}

/// Thread-safe statistics for one tree.
#[derive(Default, Debug)]
pub struct TreeStats {
	leaf_splits: AtomicU64,
	internal_splits: AtomicU64,
	leaf_merges: AtomicU64,
	internal_merges: AtomicU64,
	borrows: AtomicU64,
	root_splits: AtomicU64,
	root_collapses: AtomicU64,
	live_pages: AtomicU64,
}

impl TreeStats {
	pub(crate) fn inc_split(&self, leaf: bool) {
		if leaf {
			self.leaf_splits.fetch_add(1, Ordering::Relaxed);
		} else {
			self.internal_splits.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub(crate) fn inc_merge(&self, leaf: bool) {
		if leaf {
			self.leaf_merges.fetch_add(1, Ordering::Relaxed);
		} else {
			self.internal_merges.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub(crate) fn inc_borrows(&self) {
		self.borrows.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn inc_root_splits(&self) {
		self.root_splits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn inc_root_collapses(&self) {
		self.root_collapses.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn page_allocated(&self) {
		self.live_pages.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn page_retired(&self) {
		self.live_pages.fetch_sub(1, Ordering::Relaxed);
	}

	/// Returns the number of pages currently reachable from the root.
	pub fn live_pages(&self) -> u64 {
		self.live_pages.load(Ordering::Relaxed)
	}

	/// Captures all counters.
	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			leaf_splits: self.leaf_splits.load(Ordering::Relaxed),
			internal_splits: self.internal_splits.load(Ordering::Relaxed),
			leaf_merges: self.leaf_merges.load(Ordering::Relaxed),
			internal_merges: self.internal_merges.load(Ordering::Relaxed),
			borrows: self.borrows.load(Ordering::Relaxed),
			root_splits: self.root_splits.load(Ordering::Relaxed),
			root_collapses: self.root_collapses.load(Ordering::Relaxed),
			live_pages: self.live_pages(),
		}
	}

	/// Emits current statistics to the tracing infrastructure.
	pub fn emit_tracing(&self) {
		let snapshot = self.snapshot();
		tracing::info!(
			target: "crabtree::stats",
			leaf_splits = snapshot.leaf_splits,
			internal_splits = snapshot.internal_splits,
			leaf_merges = snapshot.leaf_merges,
			internal_merges = snapshot.internal_merges,
			borrows = snapshot.borrows,
			root_splits = snapshot.root_splits,
			root_collapses = snapshot.root_collapses,
			live_pages = snapshot.live_pages,
			"tree stats snapshot"
		);
	}
}
