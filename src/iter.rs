//! Forward range iteration over the leaf chain.
//!
//! A [`RangeIter`] descends once to the leaf holding its start key, then
//! follows `next` links from leaf to leaf. Each leaf is read under its shared
//! latch, so at most one leaf latch is held at any time and none is held
//! between calls to `next`.
//!
//! The walk remembers the smallest key it may still yield: the upper fence
//! of the last leaf it read. Entries below it are skipped, so keys come out
//! strictly ascending even when a split or a borrow moved entries across
//! leaves between two hops. A leaf reached over the chain is only trusted if
//! it is still live and its lower fence is not above that key. Otherwise a
//! merge or a borrow from the right moved entries out of it since the
//! previous leaf was read, and the walk re-descends from the root instead.
//! The leaf found by a descent covers the key, so every visit raises it and
//! re-descents cannot repeat forever.
//!
//! A scan is not a snapshot. Entries inserted or removed while it runs may or
//! may not be observed, but an entry present for the whole scan is always
//! yielded.

use crossbeam_epoch::{self as epoch, Guard};

use crate::chain::Access;
use crate::page::{LeafNode, Page};
use crate::{Key, Tree};

enum Cursor<V> {
	/// Descend from the root to the leaf covering the lower bound.
	Seek,
	/// Continue with the leaf reached through the previous leaf's link.
	Leaf(*const Page<V>),
	End,
}

/// What one visited leaf leaves behind for the walk.
struct Visit<R, V> {
	result: R,
	next: *const Page<V>,
	high: Option<Key>,
}

/// Leaf-by-leaf walk over the leaf chain from a lower bound.
///
/// Keeps the current thread pinned to the reclamation epoch until dropped.
pub(crate) struct LeafWalk<'t, V> {
	tree: &'t Tree<V>,
	eg: Guard,
	cursor: Cursor<V>,
	lower: Key,
}

impl<'t, V> LeafWalk<'t, V> {
	pub(crate) fn new(tree: &'t Tree<V>, start: Key) -> LeafWalk<'t, V> {
		LeafWalk {
			tree,
			eg: epoch::pin(),
			cursor: Cursor::Seek,
			lower: start,
		}
	}

	/// Visits the next leaf, handing `f` its entries with keys at or above
	/// the lower bound while the leaf is latched. Returns `None` once the
	/// walk has passed the last leaf.
	pub(crate) fn next_leaf<R>(&mut self, f: impl FnOnce(&[(Key, V)]) -> R) -> Option<R> {
		let tree = self.tree;
		loop {
			match self.cursor {
				Cursor::End => return None,
				Cursor::Seek => {
					let chain = tree.find(self.lower, Access::Read, &self.eg);
					let visit = Self::visit(tree, chain.page(chain.last()), chain.leaf(), self.lower, &self.eg, f);
					drop(chain);
					return Some(self.advance(visit));
				}
				Cursor::Leaf(ptr) => {
					// SAFETY: the pointer was read from a live leaf while this
					// walk's epoch guard was pinned, so the page has not been
					// freed even if it has since been retired.
					let page = unsafe { &*ptr };
					let node = page.node.shared();
					let leaf = node.as_leaf();
					if page.is_retired() || leaf.low > self.lower {
						drop(node);
						self.cursor = Cursor::Seek;
						continue;
					}
					let visit = Self::visit(tree, page, leaf, self.lower, &self.eg, f);
					drop(node);
					return Some(self.advance(visit));
				}
			}
		}
	}

	fn visit<R>(
		tree: &Tree<V>,
		page: &Page<V>,
		leaf: &LeafNode<V>,
		lower: Key,
		eg: &Guard,
		f: impl FnOnce(&[(Key, V)]) -> R,
	) -> Visit<R, V> {
		Visit {
			result: f(leaf.entries_from(lower)),
			next: tree.leaf_chain.next(page, eg).as_raw(),
			high: leaf.high,
		}
	}

	fn advance<R>(&mut self, visit: Visit<R, V>) -> R {
		self.cursor = match visit.high {
			// The rightmost leaf has no upper fence and no successor.
			None => Cursor::End,
			Some(_) if visit.next.is_null() => Cursor::End,
			Some(high) => {
				// A leaf reached past a borrow can end below the bound.
				self.lower = self.lower.max(high);
				Cursor::Leaf(visit.next)
			}
		};
		visit.result
	}
}

/// Ascending iterator over `(key, value)` pairs, starting at a given key.
///
/// Created by [`Tree::range_iter`]. Values are cloned out of each leaf while
/// it is latched. The iterator keeps the current thread pinned to the
/// reclamation epoch until it is dropped.
pub struct RangeIter<'t, V> {
	walk: LeafWalk<'t, V>,
	buffer: std::vec::IntoIter<(Key, V)>,
}

impl<'t, V> RangeIter<'t, V> {
	pub(crate) fn new(tree: &'t Tree<V>, start: Key) -> RangeIter<'t, V> {
		RangeIter {
			walk: LeafWalk::new(tree, start),
			buffer: Vec::new().into_iter(),
		}
	}
}

impl<'t, V: Clone> Iterator for RangeIter<'t, V> {
	type Item = (Key, V);

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if let Some(entry) = self.buffer.next() {
				return Some(entry);
			}
			self.buffer = self.walk.next_leaf(|entries| entries.to_vec())?.into_iter();
		}
	}
}
