//! Tree pages.
//!
//! A [`Page`] is a [`Node`] behind a [`Latch`], plus the bookkeeping that
//! lives outside the latch: the retired flag set when a merge or a root
//! collapse unlinks the page, and the leaf-chain links (protected by the
//! tree-wide leaf-chain lock rather than by the page latch).
//!
//! Both node kinds store one sorted array of `(key, payload)` pairs:
//!
//! ```text
//! Internal: [(−∞, c0), (k1, c1), (k2, c2), ...]   child ci covers [ki, ki+1)
//! Leaf:     [(k0, v0), (k1, v1), ...]
//! ```
//!
//! The key in slot 0 of an internal page is never consulted when routing. It
//! keeps whatever separator it last had so that a split or a borrow can hand
//! it back to the parent.

use crossbeam_epoch::{Atomic, Guard, Shared};
use smallvec::SmallVec;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::chain::Access;
use crate::config::Config;
use crate::latch::Latch;
use crate::leaf_chain::LeafLinks;
use crate::Key;

/// Entries kept inline before a page's array spills to the heap.
const INLINE_ENTRIES: usize = 16;

pub(crate) type LeafEntries<V> = SmallVec<[(Key, V); INLINE_ENTRIES]>;
pub(crate) type InternalEntries<V> = SmallVec<[(Key, Atomic<Page<V>>); INLINE_ENTRIES]>;

/// A latched node together with its out-of-latch bookkeeping.
pub(crate) struct Page<V> {
	pub(crate) node: Latch<Node<V>>,
	pub(crate) links: LeafLinks<V>,
	retired: AtomicBool,
}

impl<V> Page<V> {
	pub(crate) fn new(node: Node<V>) -> Page<V> {
		Page {
			node: Latch::new(node),
			links: LeafLinks::default(),
			retired: AtomicBool::new(false),
		}
	}

	/// Marks the page as unlinked from the tree. Must be called while the
	/// page is latched exclusively, before the page is handed to the epoch
	/// collector.
	#[inline]
	pub(crate) fn retire(&self) {
		self.retired.store(true, Ordering::Release);
	}

	/// Returns `true` once the page has been unlinked by a merge or a root
	/// collapse. A reader that reached the page through a leaf-chain link
	/// must re-descend from the root when this is set.
	#[inline]
	pub(crate) fn is_retired(&self) -> bool {
		self.retired.load(Ordering::Acquire)
	}
}

/// Node of the tree.
pub(crate) enum Node<V> {
	Internal(InternalNode<V>),
	Leaf(LeafNode<V>),
}

impl<V> Node<V> {
	/// Returns `true` if this is a leaf node.
	#[inline]
	pub(crate) fn is_leaf(&self) -> bool {
		matches!(self, Node::Leaf(_))
	}

	/// Number of entries (children for internal nodes, sentinel included).
	#[inline]
	pub(crate) fn len(&self) -> usize {
		match self {
			Node::Internal(internal) => internal.entries.len(),
			Node::Leaf(leaf) => leaf.entries.len(),
		}
	}

	#[inline]
	pub(crate) fn capacity(&self, config: &Config) -> usize {
		match self {
			Node::Internal(_) => config.internal_capacity(),
			Node::Leaf(_) => config.leaf_capacity(),
		}
	}

	#[inline]
	pub(crate) fn min_len(&self, config: &Config) -> usize {
		match self {
			Node::Internal(_) => config.internal_min(),
			Node::Leaf(_) => config.leaf_min(),
		}
	}

	/// Returns `true` if the node holds more entries than it may keep.
	#[inline]
	pub(crate) fn is_overfull(&self, config: &Config) -> bool {
		self.len() > self.capacity(config)
	}

	/// Returns `true` if a non-root node dropped below minimum occupancy.
	#[inline]
	pub(crate) fn is_underfull(&self, config: &Config) -> bool {
		self.len() < self.min_len(config)
	}

	/// The safe-node predicate: a safe node cannot propagate a structural
	/// change to its parent during an operation of kind `access`, so every
	/// latch above it may be released.
	///
	/// An internal root is safe for delete only with more than two children,
	/// since losing one of two would collapse it. A leaf root has no lower
	/// bound.
	pub(crate) fn is_safe(&self, access: Access, is_root: bool, config: &Config) -> bool {
		match access {
			Access::Read => true,
			Access::Insert => self.len() < self.capacity(config),
			Access::Delete => match (is_root, self) {
				(true, Node::Leaf(_)) => true,
				(true, Node::Internal(internal)) => internal.entries.len() > 2,
				(false, node) => node.len() > node.min_len(config),
			},
		}
	}

	/// Returns a reference to the inner leaf node.
	///
	/// # Panics
	///
	/// Panics if called on an internal node.
	#[inline]
	pub(crate) fn as_leaf(&self) -> &LeafNode<V> {
		match self {
			Node::Leaf(leaf) => leaf,
			Node::Internal(_) => {
				unreachable!("as_leaf() called on internal node - this indicates a traversal bug")
			}
		}
	}

	/// Returns a mutable reference to the inner leaf node.
	///
	/// # Panics
	///
	/// Panics if called on an internal node.
	#[inline]
	pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<V> {
		match self {
			Node::Leaf(leaf) => leaf,
			Node::Internal(_) => {
				unreachable!("as_leaf_mut() called on internal node - this indicates a traversal bug")
			}
		}
	}

	/// Returns a reference to the inner internal node.
	///
	/// # Panics
	///
	/// Panics if called on a leaf node.
	#[inline]
	pub(crate) fn as_internal(&self) -> &InternalNode<V> {
		match self {
			Node::Internal(internal) => internal,
			Node::Leaf(_) => {
				unreachable!("as_internal() called on leaf node - this indicates a traversal bug")
			}
		}
	}

	/// Returns a mutable reference to the inner internal node.
	///
	/// # Panics
	///
	/// Panics if called on a leaf node.
	#[inline]
	pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<V> {
		match self {
			Node::Internal(internal) => internal,
			Node::Leaf(_) => {
				unreachable!("as_internal_mut() called on leaf node - this indicates a traversal bug")
			}
		}
	}

	/// Appends every entry of `right` to `self`, leaving `right` empty.
	///
	/// `separator` is the parent's key for `right`. It becomes the routing
	/// key of `right`'s first child when internal nodes are merged.
	pub(crate) fn merge_from(&mut self, right: &mut Node<V>, separator: Key) {
		match (self, right) {
			(Node::Leaf(left), Node::Leaf(right)) => {
				left.entries.extend(right.entries.drain(..));
				left.high = right.high;
			}
			(Node::Internal(left), Node::Internal(right)) => {
				let mut moved = right.entries.drain(..);
				if let Some((_, first)) = moved.next() {
					left.entries.push((separator, first));
				}
				left.entries.extend(moved);
			}
			_ => unreachable!("merge of a leaf with an internal node"),
		}
	}

	/// Moves the first entry of the right sibling to the end of `self`.
	///
	/// `separator` is the parent's key for `right`. Returns the key the
	/// parent must record for `right` afterwards.
	pub(crate) fn borrow_from_right(&mut self, right: &mut Node<V>, separator: Key) -> Key {
		match (self, right) {
			(Node::Leaf(left), Node::Leaf(right)) => {
				let entry = right.entries.remove(0);
				left.entries.push(entry);
				right.low = right.entries[0].0;
				left.high = Some(right.low);
				right.low
			}
			(Node::Internal(left), Node::Internal(right)) => {
				let (_, child) = right.entries.remove(0);
				left.entries.push((separator, child));
				right.entries[0].0
			}
			_ => unreachable!("borrow between a leaf and an internal node"),
		}
	}

	/// Moves the last entry of the left sibling to the front of `self`.
	///
	/// `separator` is the parent's key for `self`. Returns the key the
	/// parent must record for `self` afterwards.
	pub(crate) fn borrow_from_left(&mut self, left: &mut Node<V>, separator: Key) -> Key {
		match (self, left) {
			(Node::Leaf(right), Node::Leaf(left)) => {
				let Some(entry) = left.entries.pop() else {
					unreachable!("borrow from an empty leaf")
				};
				right.low = entry.0;
				left.high = Some(entry.0);
				right.entries.insert(0, entry);
				right.low
			}
			(Node::Internal(right), Node::Internal(left)) => {
				let Some((key, child)) = left.entries.pop() else {
					unreachable!("borrow from an empty internal node")
				};
				// The old first child now sits behind a real separator.
				right.entries[0].0 = separator;
				right.entries.insert(0, (key, child));
				key
			}
			_ => unreachable!("borrow between a leaf and an internal node"),
		}
	}
}

/// Leaf node: sorted `(key, value)` pairs.
///
/// `low` and `high` are the fence keys of the leaf: it holds every key in
/// `[low, high)`, where `high` is `None` for the rightmost leaf. They equal
/// the separators that route to the leaf and only move under its exclusive
/// latch, on a split, a merge or a borrow. The right neighbour's `low` is
/// always this leaf's `high`.
pub(crate) struct LeafNode<V> {
	pub(crate) entries: LeafEntries<V>,
	pub(crate) low: Key,
	pub(crate) high: Option<Key>,
}

impl<V> LeafNode<V> {
	pub(crate) fn new(capacity: usize) -> LeafNode<V> {
		LeafNode {
			entries: SmallVec::with_capacity(capacity + 1),
			low: Key::MIN,
			high: None,
		}
	}

	/// Index of the last entry whose key is `<= key`, or `None` if `key` is
	/// smaller than every key in the leaf.
	#[inline]
	pub(crate) fn search(&self, key: Key) -> Option<usize> {
		self.entries.partition_point(|(k, _)| *k <= key).checked_sub(1)
	}

	/// Exact-match position of `key`.
	#[inline]
	pub(crate) fn position(&self, key: Key) -> Option<usize> {
		self.search(key).filter(|&i| self.entries[i].0 == key)
	}

	#[inline]
	pub(crate) fn get(&self, key: Key) -> Option<&V> {
		self.position(key).map(|i| &self.entries[i].1)
	}

	/// Inserts a new entry in key order. Returns `false` without touching
	/// the leaf when the key is already present.
	pub(crate) fn insert(&mut self, key: Key, value: V) -> bool {
		let pos = match self.search(key) {
			Some(i) if self.entries[i].0 == key => return false,
			Some(i) => i + 1,
			None => 0,
		};
		self.entries.insert(pos, (key, value));
		true
	}

	/// Removes the entry for `key`, shifting later entries left.
	pub(crate) fn remove(&mut self, key: Key) -> Option<V> {
		let pos = self.position(key)?;
		Some(self.entries.remove(pos).1)
	}

	/// Index at which an overflowing leaf is cut: the right half receives
	/// the floor half of the entries.
	#[inline]
	pub(crate) fn split_point(&self) -> usize {
		self.entries.len() - self.entries.len() / 2
	}

	/// Drops the entries from `at` onward once they live in a sibling, whose
	/// first key becomes this leaf's upper fence.
	#[inline]
	pub(crate) fn truncate(&mut self, at: usize) {
		self.high = Some(self.entries[at].0);
		self.entries.truncate(at);
	}

	/// The entries whose keys are `>= lower`.
	#[inline]
	pub(crate) fn entries_from(&self, lower: Key) -> &[(Key, V)] {
		let start = self.entries.partition_point(|(k, _)| *k < lower);
		&self.entries[start..]
	}
}

impl<V: Clone> LeafNode<V> {
	/// Builds the right sibling from a copy of the entries from `at` onward.
	/// The source leaf is left intact so that it stays readable until the
	/// sibling has been linked into the leaf chain.
	pub(crate) fn copy_upper(&self, at: usize, capacity: usize) -> LeafNode<V> {
		let mut right = LeafNode::new(capacity);
		right.entries.extend(self.entries[at..].iter().cloned());
		right.low = right.entries[0].0;
		right.high = self.high;
		right
	}
}

/// Internal node: a sentinel child followed by `(separator, child)` pairs.
pub(crate) struct InternalNode<V> {
	pub(crate) entries: InternalEntries<V>,
}

impl<V> InternalNode<V> {
	/// Creates the root produced by a root split.
	pub(crate) fn new_root(
		capacity: usize,
		left: Shared<'_, Page<V>>,
		separator: Key,
		right: Shared<'_, Page<V>>,
	) -> InternalNode<V> {
		let mut entries = SmallVec::with_capacity(capacity + 1);
		entries.push((Key::MIN, Atomic::from(left)));
		entries.push((separator, Atomic::from(right)));
		InternalNode {
			entries,
		}
	}

	/// Index of the child whose key range contains `key`.
	#[inline]
	pub(crate) fn child_index(&self, key: Key) -> usize {
		self.entries[1..].partition_point(|(k, _)| *k <= key)
	}

	#[inline]
	pub(crate) fn child<'g>(&self, index: usize, guard: &'g Guard) -> Shared<'g, Page<V>> {
		self.entries[index].1.load(Ordering::Acquire, guard)
	}

	/// Inserts `(separator, child)` directly after the child at `slot`.
	#[inline]
	pub(crate) fn insert_after(&mut self, slot: usize, separator: Key, child: Shared<'_, Page<V>>) {
		debug_assert!(slot + 1 == self.entries.len() || self.entries[slot + 1].0 > separator);
		self.entries.insert(slot + 1, (separator, Atomic::from(child)));
	}

	/// Removes the child at `slot` along with its separator.
	#[inline]
	pub(crate) fn remove_at(&mut self, slot: usize) {
		self.entries.remove(slot);
	}

	/// Moves the upper half of an overflowing node into a new node. The
	/// returned node's slot-0 key is the separator to publish in the parent.
	pub(crate) fn split_upper(&mut self, capacity: usize) -> InternalNode<V> {
		let at = self.entries.len() - self.entries.len() / 2;
		let mut entries = SmallVec::with_capacity(capacity + 1);
		entries.extend(self.entries.drain(at..));
		InternalNode {
			entries,
		}
	}
}
