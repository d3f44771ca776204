//! # Crabtree: A Concurrent In-Memory B+ Tree
//!
//! This crate provides an ordered index over `u64` keys that many threads can
//! read and modify at once. Instead of one lock around the whole structure,
//! every page carries its own reader-writer latch and operations use
//! **pessimistic latch coupling** ("crabbing") to hold only the latches they
//! may still need.
//!
//! ## Design Overview
//!
//! ### Latch coupling
//!
//! Every operation first latches the root pointer, then walks down, latching
//! each child before deciding whether to let go of the latches above it. The
//! decision is the **safe-node rule**: a page is safe when the pending
//! operation cannot change its parent.
//!
//! - **Read**: every page is safe, so at most two latches are ever held.
//! - **Insert**: a page is safe when it has room for one more entry.
//! - **Delete**: a page is safe when it stays at or above its minimum
//!   occupancy after losing one entry. A leaf root is always safe; an
//!   internal root is safe while it has more than two children.
//!
//! When the freshly latched page is safe, every latch above it is released.
//! The latches still held form the *latch chain*, a per-operation stack that
//! splits and merges walk back up instead of following parent pointers.
//!
//! ### Structure
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │   Root Latch    │  <- Guards replacement of the root
//!                    └────────┬────────┘
//!                             ▼
//!                    ┌─────────────────┐
//!                    │  Internal Page  │  <- [(−∞, c0), (k1, c1), ...]
//!                    └────────┬────────┘
//!              ┌──────────────┼──────────────┐
//!              ▼              ▼              ▼
//!        ┌──────────┐  ┌──────────┐  ┌──────────┐
//!        │   Leaf   │⇄ │   Leaf   │⇄ │   Leaf   │  <- Leaf chain for scans
//!        └──────────┘  └──────────┘  └──────────┘
//! ```
//!
//! ### Lock ordering
//!
//! Latches are acquired top-down: root latch, then pages from root to leaf.
//! A rebalance additionally latches one sibling of the underflowing page,
//! always while holding their common parent exclusively, so no other thread
//! can be waiting on the pair. Range scans hold at most one leaf latch and
//! take the leaf-chain lock last; nothing waits on a page latch while holding
//! the leaf-chain lock.
//!
//! ### Memory reclamation
//!
//! Pages unlinked by a merge or a root collapse are marked retired and freed
//! through `crossbeam_epoch`, so a range scan that is about to follow a leaf
//! link into a page that has just been merged away still reads valid memory
//! and notices the page was retired.
//!
//! ## Basic Usage
//!
//! ```
//! use crabtree::{Error, Tree};
//!
//! let tree = Tree::with_degree(4).unwrap();
//!
//! tree.insert(1, 10).unwrap();
//! tree.insert(2, 20).unwrap();
//! assert_eq!(tree.insert(1, 99), Err(Error::AlreadyExists(1)));
//!
//! assert_eq!(tree.lookup(1), Ok(10));
//! assert_eq!(tree.range(0, 10), vec![10, 20]);
//!
//! assert_eq!(tree.remove(1), Ok(10));
//! assert_eq!(tree.lookup(1), Err(Error::NotFound(1)));
//! ```
//!
//! ## Thread Safety
//!
//! The tree can be shared across threads via `Arc<Tree<V>>`. All operations
//! take `&self`.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod config;
pub mod error;
pub mod iter;
pub mod latch;
pub mod stats;

mod chain;
mod leaf_chain;
mod page;
mod sync;

pub use config::{Config, DEFAULT_DEGREE, MIN_DEGREE};
pub use error::{Error, Result};
pub use iter::RangeIter;
pub use stats::{StatsSnapshot, TreeStats};

use chain::{Access, LatchChain, Link, Parent};
use iter::LeafWalk;
use latch::{Held, Latch};
use leaf_chain::LeafChain;
use page::{InternalNode, LeafNode, Node, Page};

/// Key type of the index.
pub type Key = u64;

/// A concurrent B+ tree mapping [`Key`]s to values of type `V`.
///
/// # Internal Structure
///
/// - A **root latch** (`Latch<Atomic<Page>>`) guards the root pointer. Every
///   traversal takes it first, so replacing the root on a split or a
///   collapse is ordered against every traversal picking up the root.
/// - A **leaf-chain lock** serializes linking and unlinking of leaves.
/// - A **height counter**: 1 while the root is a leaf.
pub struct Tree<V = u64> {
	root: Latch<Atomic<Page<V>>>,
	leaf_chain: LeafChain,
	config: Config,
	height: AtomicUsize,
	stats: TreeStats,
}

impl<V> Default for Tree<V> {
	fn default() -> Self {
		Self::new()
	}
}

impl<V> Tree<V> {
	// -----------------------------------------------------------------------
	// Construction
	// -----------------------------------------------------------------------

	/// Creates a new, empty tree with [`DEFAULT_DEGREE`].
	///
	/// # Example
	///
	/// ```
	/// use crabtree::Tree;
	///
	/// let tree: Tree = Tree::new();
	/// assert!(tree.is_empty());
	/// assert_eq!(tree.height(), 1); // Single leaf page
	/// ```
	pub fn new() -> Self {
		Self::build(Config::default())
	}

	/// Creates a new, empty tree whose pages hold at most `degree` entries.
	///
	/// Returns [`Error::InvalidDegree`] if `degree < MIN_DEGREE`.
	pub fn with_degree(degree: usize) -> Result<Self> {
		Self::with_config(Config::new(degree))
	}

	/// Creates a new, empty tree from a validated configuration.
	pub fn with_config(config: Config) -> Result<Self> {
		config.validate()?;
		Ok(Self::build(config))
	}

	fn build(config: Config) -> Self {
		let root = Page::new(Node::Leaf(LeafNode::new(config.leaf_capacity())));
		let stats = TreeStats::default();
		stats.page_allocated();
		tracing::debug!(degree = config.degree, "created tree");
		Tree {
			root: Latch::new(Atomic::new(root)),
			leaf_chain: LeafChain::new(),
			config,
			height: AtomicUsize::new(1),
			stats,
		}
	}

	// -----------------------------------------------------------------------
	// Tree Metadata
	// -----------------------------------------------------------------------

	/// Returns the current height of the tree (1 while the root is a leaf).
	///
	/// Under concurrent modification the value may be stale by the time it is
	/// used.
	pub fn height(&self) -> usize {
		self.height.load(Ordering::Relaxed)
	}

	/// Maximum number of entries in a leaf page.
	pub fn degree(&self) -> usize {
		self.config.degree
	}

	/// Returns a snapshot of the structural counters.
	pub fn stats(&self) -> StatsSnapshot {
		self.stats.snapshot()
	}

	/// Logs the structural counters at `info` level.
	pub fn emit_stats(&self) {
		self.stats.emit_tracing();
	}

	// -----------------------------------------------------------------------
	// Latch-Coupling Traversal
	// -----------------------------------------------------------------------

	/// Descends from the root to the leaf responsible for `key`.
	///
	/// Each page is latched (shared for reads, exclusive otherwise) before
	/// the latches above it are considered for release. The returned chain
	/// ends with the leaf and still holds every ancestor a split or merge may
	/// have to modify.
	fn find<'g>(&'g self, key: Key, access: Access, eg: &'g Guard) -> LatchChain<'g, V> {
		let shared = access.is_shared();
		let mut chain = LatchChain::new();

		let root = Held::acquire(&self.root, shared);
		// SAFETY: the root pointer is never null and is only replaced while
		// its latch is held exclusively.
		let mut page = unsafe { root.load(Ordering::Acquire, eg).deref() };
		chain.push(Link::Root(root));

		let mut slot = 0;
		let mut is_root = true;
		loop {
			let guard = Held::acquire(&page.node, shared);
			let safe = guard.is_safe(access, is_root, &self.config);
			let child = match &*guard {
				Node::Internal(internal) => {
					let index = internal.child_index(key);
					Some((index, internal.child(index, eg)))
				}
				Node::Leaf(_) => None,
			};
			chain.push(Link::Page {
				page,
				guard,
				slot,
			});
			if safe {
				chain.release_ancestors();
			}

			match child {
				Some((index, child)) => {
					// SAFETY: a child of a latched page cannot be retired
					// until that page is latched exclusively.
					page = unsafe { child.deref() };
					slot = index;
					is_root = false;
				}
				None => return chain,
			}
		}
	}

	// -----------------------------------------------------------------------
	// Point Operations
	// -----------------------------------------------------------------------

	/// Returns `true` if the tree contains `key`.
	pub fn contains_key(&self, key: Key) -> bool {
		let eg = epoch::pin();
		let chain = self.find(key, Access::Read, &eg);
		chain.leaf().position(key).is_some()
	}

	/// Returns the number of entries in the tree.
	///
	/// This walks every leaf, counting entries under each leaf's shared
	/// latch without copying them.
	pub fn len(&self) -> usize {
		let mut walk = LeafWalk::new(self, Key::MIN);
		let mut len = 0;
		while let Some(n) = walk.next_leaf(|entries| entries.len()) {
			len += n;
		}
		len
	}

	/// Returns `true` if the tree contains no entries.
	pub fn is_empty(&self) -> bool {
		let mut walk = LeafWalk::new(self, Key::MIN);
		while let Some(n) = walk.next_leaf(|entries| entries.len()) {
			if n > 0 {
				return false;
			}
		}
		true
	}

	/// Removes `key` from the tree, returning its value.
	///
	/// Returns [`Error::NotFound`] without modifying the tree if the key is
	/// absent.
	pub fn remove(&self, key: Key) -> Result<V> {
		let eg = epoch::pin();
		let mut chain = self.find(key, Access::Delete, &eg);
		let value = chain.leaf_mut().remove(key).ok_or(Error::NotFound(key))?;
		let at = chain.last();
		self.rebalance(&mut chain, at, &eg);
		Ok(value)
	}

	// -----------------------------------------------------------------------
	// Merge/Rebalance Engine
	// -----------------------------------------------------------------------

	/// Restores minimum occupancy from the page at chain index `at` upward.
	///
	/// An underflowing page is paired with its right sibling, or with its left
	/// sibling when it is the last child. The pair is merged when the entries
	/// fit in one page; otherwise one entry is borrowed and the walk stops. A
	/// merge removes one child from the parent, which may underflow in turn.
	/// An internal root left with a single child is replaced by that child.
	fn rebalance<'g>(&'g self, chain: &mut LatchChain<'g, V>, mut at: usize, eg: &'g Guard) {
		loop {
			// The root has no lower bound, and a page whose parent was
			// released was safe when latched, so it cannot underflow.
			let p = match chain.parent_of(at) {
				Parent::Page(p) => p,
				Parent::Root(_) | Parent::Released => return,
			};
			if !chain.node(at).is_underfull(&self.config) {
				return;
			}

			let slot = chain.slot(at);
			let page = chain.page(at);
			let children = chain.node(p).len();
			debug_assert!(children >= 2, "non-root internal page with {children} children");
			// A last child has no right sibling and pairs with its left one.
			// Either sibling is latched only under the exclusively held common
			// parent, and every path to it runs through that parent, so no
			// other writer holds one sibling while waiting on the other. Scans
			// never wait on a page latch while holding one.
			let from_right = slot + 1 < children;
			let sibling_slot = if from_right {
				slot + 1
			} else {
				slot - 1
			};
			// SAFETY: children of the exclusively latched parent are live.
			let sibling_page = unsafe { chain.node(p).as_internal().child(sibling_slot, eg).deref() };
			let mut sibling = sibling_page.node.exclusive();

			let (parent, node) = chain.parent_and_node_mut(at);
			let parent = parent.as_internal_mut();
			let is_leaf = node.is_leaf();
			let merge = node.len() + sibling.len() <= node.capacity(&self.config);

			if from_right {
				let separator = parent.entries[slot + 1].0;
				if merge {
					node.merge_from(&mut sibling, separator);
					parent.remove_at(slot + 1);
					self.retire(sibling_page, is_leaf, eg);
				} else {
					parent.entries[slot + 1].0 = node.borrow_from_right(&mut sibling, separator);
				}
			} else {
				let separator = parent.entries[slot].0;
				if merge {
					sibling.merge_from(node, separator);
					parent.remove_at(slot);
					self.retire(page, is_leaf, eg);
				} else {
					parent.entries[slot].0 = node.borrow_from_left(&mut sibling, separator);
				}
			}
			drop(sibling);

			tracing::trace!(
				target: "crabtree::merge",
				kind = kind(is_leaf),
				direction = if from_right { "right" } else { "left" },
				action = if merge { "merge" } else { "borrow" },
				len = parent.entries.len(),
				"rebalanced page"
			);

			if !merge {
				self.stats.inc_borrows();
				return;
			}
			self.stats.inc_merge(is_leaf);

			if let Parent::Root(r) = chain.parent_of(p) {
				if chain.node(p).len() == 1 {
					self.collapse_root(chain, r, p, eg);
				}
				return;
			}
			at = p;
		}
	}

	/// Replaces an internal root that has a single child with that child.
	fn collapse_root<'g>(&'g self, chain: &LatchChain<'g, V>, r: usize, p: usize, eg: &'g Guard) {
		let old = chain.page(p);
		let child = chain.node(p).as_internal().child(0, eg);
		chain.root(r).store(child, Ordering::Release);
		let height = self.height.fetch_sub(1, Ordering::Relaxed) - 1;
		self.stats.inc_root_collapses();
		self.retire(old, false, eg);
		tracing::trace!(target: "crabtree::root", height, "root collapsed");
	}

	/// Unlinks an exclusively latched page and hands it to the collector.
	fn retire(&self, page: &Page<V>, is_leaf: bool, eg: &Guard) {
		if is_leaf {
			self.leaf_chain.unlink(page, eg);
		}
		page.retire();
		self.stats.page_retired();
		// SAFETY: the page is no longer reachable from the tree or the leaf
		// chain, and threads that still hold a reference are pinned.
		unsafe { eg.defer_destroy(Shared::from(page as *const Page<V>)) };
	}

	// -----------------------------------------------------------------------
	// Debugging
	// -----------------------------------------------------------------------

	/// Writes a human-readable dump of the tree structure.
	///
	/// Pages are latched shared top-down, so the dump is memory safe while
	/// mutators run, but it is only a consistent picture when they do not.
	pub fn debug_print(&self, out: &mut impl fmt::Write) -> fmt::Result {
		let eg = epoch::pin();
		let root = self.root.shared();
		writeln!(out, "Tree(degree={}, height={})", self.config.degree, self.height())?;
		// SAFETY: the root pointer is never null while its latch is held.
		let page = unsafe { root.load(Ordering::Acquire, &eg).deref() };
		Self::print_page(out, page, "", "", &eg)
	}

	fn print_page(
		out: &mut impl fmt::Write,
		page: &Page<V>,
		prefix: &str,
		child_prefix: &str,
		eg: &Guard,
	) -> fmt::Result {
		let node = page.node.shared();
		match &*node {
			Node::Leaf(leaf) => {
				write!(out, "{prefix}leaf [")?;
				write_keys(out, leaf.entries.iter().map(|(k, _)| *k))?;
				writeln!(out, "]")
			}
			Node::Internal(internal) => {
				write!(out, "{prefix}internal [")?;
				write_keys(out, internal.entries[1..].iter().map(|(k, _)| *k))?;
				writeln!(out, "]")?;
				let last = internal.entries.len() - 1;
				for (i, (_, child)) in internal.entries.iter().enumerate() {
					let (branch, indent) = if i == last {
						("└── ", "    ")
					} else {
						("├── ", "│   ")
					};
					// SAFETY: children of a latched page are live.
					let child = unsafe { child.load(Ordering::Acquire, eg).deref() };
					Self::print_page(
						out,
						child,
						&format!("{child_prefix}{branch}"),
						&format!("{child_prefix}{indent}"),
						eg,
					)?;
				}
				Ok(())
			}
		}
	}

	/// Validates all tree invariants. Panics with diagnostic info if any
	/// invariant is violated.
	///
	/// # Invariants Checked
	///
	/// 1. Key ordering: keys strictly increasing within each page
	/// 2. Occupancy: every non-root page within `[min, capacity]`; an
	///    internal root has at least two children
	/// 3. Separator bounds: every key in a child lies in `[separator, next separator)`
	/// 4. Height: all leaves at depth `height`
	/// 5. Leaf chain: links in both directions follow the in-order leaf sequence
	/// 6. Accounting: reachable pages match the live page counter, and none
	///    is retired
	/// 7. Fences: every leaf's fences equal the bounds its separators give it
	///
	/// Intended for quiescent trees, typically in tests.
	pub fn assert_invariants(&self) {
		let eg = epoch::pin();
		let root = self.root.shared();
		let height = self.height();
		// SAFETY: the root pointer is never null while its latch is held.
		let page = unsafe { root.load(Ordering::Acquire, &eg).deref() };

		let mut leaves = Vec::new();
		let pages = self.check_page(page, true, 1, height, None, None, &mut leaves, &eg);
		assert_eq!(
			pages as u64,
			self.stats.live_pages(),
			"reachable pages {} != live page counter {}",
			pages,
			self.stats.live_pages()
		);

		let first = leaves[0];
		assert!(self.leaf_chain.prev(first, &eg).is_null(), "first leaf has a predecessor");
		for pair in leaves.windows(2) {
			let next = self.leaf_chain.next(pair[0], &eg);
			let prev = self.leaf_chain.prev(pair[1], &eg);
			assert!(std::ptr::eq(next.as_raw(), pair[1]), "leaf chain skips or reorders a leaf");
			assert!(std::ptr::eq(prev.as_raw(), pair[0]), "leaf chain back link is stale");
		}
		let last = leaves[leaves.len() - 1];
		assert!(self.leaf_chain.next(last, &eg).is_null(), "last leaf has a successor");
	}

	/// Recursively validates a page and its subtree, returning the number of
	/// pages in it.
	///
	/// `lower` is inclusive and `upper` exclusive; `None` means unbounded.
	#[allow(clippy::too_many_arguments)]
	fn check_page<'g>(
		&self,
		page: &'g Page<V>,
		is_root: bool,
		depth: usize,
		height: usize,
		lower: Option<Key>,
		upper: Option<Key>,
		leaves: &mut Vec<&'g Page<V>>,
		eg: &'g Guard,
	) -> usize {
		assert!(!page.is_retired(), "retired page reachable at depth {depth}");
		let node = page.node.shared();
		let len = node.len();
		let capacity = node.capacity(&self.config);
		assert!(len <= capacity, "page at depth {depth} holds {len} > {capacity} entries");
		if is_root {
			assert!(node.is_leaf() || len >= 2, "internal root with {len} children");
		} else {
			let min = node.min_len(&self.config);
			assert!(len >= min, "page at depth {depth} holds {len} < {min} entries");
		}

		let keys: Vec<Key> = match &*node {
			Node::Leaf(leaf) => leaf.entries.iter().map(|(k, _)| *k).collect(),
			Node::Internal(internal) => internal.entries[1..].iter().map(|(k, _)| *k).collect(),
		};
		for w in keys.windows(2) {
			assert!(w[0] < w[1], "keys not sorted at depth {depth}: {} >= {}", w[0], w[1]);
		}
		for &k in &keys {
			if let Some(lower) = lower {
				assert!(k >= lower, "key {k} below its lower bound {lower}");
			}
			if let Some(upper) = upper {
				assert!(k < upper, "key {k} not below its upper bound {upper}");
			}
		}

		match &*node {
			Node::Leaf(leaf) => {
				assert_eq!(depth, height, "leaf at depth {depth} in a tree of height {height}");
				let low = lower.unwrap_or(Key::MIN);
				assert_eq!(leaf.low, low, "leaf lower fence {} differs from its separator {low}", leaf.low);
				assert_eq!(leaf.high, upper, "leaf upper fence {:?} differs from {upper:?}", leaf.high);
				leaves.push(page);
				1
			}
			Node::Internal(internal) => {
				assert!(depth < height, "internal page at leaf depth {depth}");
				let mut pages = 1;
				for (i, (key, child)) in internal.entries.iter().enumerate() {
					let lo = if i == 0 {
						lower
					} else {
						Some(*key)
					};
					let hi = internal.entries.get(i + 1).map(|(k, _)| *k).or(upper);
					// SAFETY: children of a latched page are live.
					let child = unsafe { child.load(Ordering::Acquire, eg).deref() };
					pages += self.check_page(child, false, depth + 1, height, lo, hi, leaves, eg);
				}
				pages
			}
		}
	}
}

impl<V: Clone> Tree<V> {
	/// Inserts a key-value pair.
	///
	/// Returns [`Error::AlreadyExists`] without modifying the tree if the key
	/// is present; the stored value is kept.
	pub fn insert(&self, key: Key, value: V) -> Result<()> {
		let eg = epoch::pin();
		let mut chain = self.find(key, Access::Insert, &eg);
		if !chain.leaf_mut().insert(key, value) {
			return Err(Error::AlreadyExists(key));
		}
		let at = chain.last();
		if chain.node(at).is_overfull(&self.config) {
			self.split(&mut chain, at, &eg);
		}
		Ok(())
	}

	/// Returns the value stored for `key`, or [`Error::NotFound`].
	pub fn lookup(&self, key: Key) -> Result<V> {
		self.get(key).ok_or(Error::NotFound(key))
	}

	/// Returns a clone of the value stored for `key`.
	pub fn get(&self, key: Key) -> Option<V> {
		let eg = epoch::pin();
		let chain = self.find(key, Access::Read, &eg);
		chain.leaf().get(key).cloned()
	}

	/// Returns up to `max_count` values in ascending key order, starting at
	/// the first key `>= start`.
	pub fn range(&self, start: Key, max_count: usize) -> Vec<V> {
		self.range_iter(start).take(max_count).map(|(_, v)| v).collect()
	}

	/// Returns an ascending iterator over entries with keys `>= start`.
	pub fn range_iter(&self, start: Key) -> RangeIter<'_, V> {
		RangeIter::new(self, start)
	}

	// -----------------------------------------------------------------------
	// Split Engine
	// -----------------------------------------------------------------------

	/// Splits the overflowing page at chain index `at`, then every ancestor
	/// that overflows in turn.
	///
	/// The upper half of the page moves into a new right sibling whose first
	/// key becomes the separator in the parent. A root split grows the tree
	/// by one level.
	fn split<'g>(&'g self, chain: &mut LatchChain<'g, V>, mut at: usize, eg: &'g Guard) {
		loop {
			let page = chain.page(at);
			let node = chain.node_mut(at);
			let is_leaf = node.is_leaf();
			let (separator, sibling) = match node {
				Node::Leaf(leaf) => {
					let cut = leaf.split_point();
					let right = leaf.copy_upper(cut, self.config.leaf_capacity());
					let separator = right.entries[0].0;
					let sibling = Owned::new(Page::new(Node::Leaf(right))).into_shared(eg);
					// Link the sibling before the entries leave this leaf.
					self.leaf_chain.splice_after(page, sibling, eg);
					leaf.truncate(cut);
					(separator, sibling)
				}
				Node::Internal(internal) => {
					let right = internal.split_upper(self.config.internal_capacity());
					let separator = right.entries[0].0;
					(separator, Owned::new(Page::new(Node::Internal(right))).into_shared(eg))
				}
			};
			self.stats.page_allocated();
			self.stats.inc_split(is_leaf);
			tracing::trace!(
				target: "crabtree::split",
				kind = kind(is_leaf),
				len = node.len(),
				separator,
				"page split"
			);

			match chain.parent_of(at) {
				Parent::Page(p) => {
					let slot = chain.slot(at);
					let parent = chain.node_mut(p);
					parent.as_internal_mut().insert_after(slot, separator, sibling);
					if !parent.is_overfull(&self.config) {
						return;
					}
					at = p;
				}
				Parent::Root(r) => {
					let root = chain.root(r);
					let old = root.load(Ordering::Relaxed, eg);
					let capacity = self.config.internal_capacity();
					let new_root = InternalNode::new_root(capacity, old, separator, sibling);
					root.store(Owned::new(Page::new(Node::Internal(new_root))), Ordering::Release);
					let height = self.height.fetch_add(1, Ordering::Relaxed) + 1;
					self.stats.page_allocated();
					self.stats.inc_root_splits();
					tracing::trace!(target: "crabtree::root", height, separator, "root split");
					return;
				}
				Parent::Released => unreachable!("split propagated above a released latch"),
			}
		}
	}
}

impl<V> fmt::Display for Tree<V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.debug_print(f)
	}
}

impl<V> fmt::Debug for Tree<V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tree")
			.field("degree", &self.config.degree)
			.field("height", &self.height())
			.field("stats", &self.stats.snapshot())
			.finish()
	}
}

impl<V> Drop for Tree<V> {
	fn drop(&mut self) {
		// SAFETY: `&mut self` rules out concurrent access. Retired pages are
		// owned by the collector and are no longer reachable from the root.
		unsafe {
			let eg = epoch::unprotected();
			let root = self.root.get_mut().swap(Shared::null(), Ordering::Relaxed, eg);
			free_subtree(root, eg);
		}
	}
}

/// Frees `page` and every page below it.
///
/// # Safety
///
/// No other thread may access the subtree.
unsafe fn free_subtree<V>(page: Shared<'_, Page<V>>, eg: &Guard) {
	if page.is_null() {
		return;
	}
	let mut owned = unsafe { page.into_owned() };
	if let Node::Internal(internal) = owned.node.get_mut() {
		for (_, child) in internal.entries.drain(..) {
			unsafe { free_subtree(child.load(Ordering::Relaxed, eg), eg) };
		}
	}
}

fn kind(is_leaf: bool) -> &'static str {
	if is_leaf {
		"leaf"
	} else {
		"internal"
	}
}

fn write_keys(out: &mut impl fmt::Write, keys: impl Iterator<Item = Key>) -> fmt::Result {
	for (i, k) in keys.enumerate() {
		if i > 0 {
			out.write_str(", ")?;
		}
		write!(out, "{k}")?;
	}
	Ok(())
}
