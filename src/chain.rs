//! The latch chain: latches held by one operation, root to leaf.
//!
//! A traversal pushes every latch it acquires. Once the page it just latched
//! is safe for the operation, every latch above it is released, so the chain
//! always holds a contiguous path ending at the deepest page reached. The
//! first link is either the root latch or the highest page whose parent was
//! released.
//!
//! Splits and merges walk the chain upward: the parent of the page at index
//! `i` is the link at `i - 1`, if that link is still held. A page with no
//! held parent was safe when it was latched, so no structural change can
//! reach above it.
//!
//! The chain is owned by the public call that created it and is dropped
//! (releasing every latch) when that call returns.

use crossbeam_epoch::Atomic;
use smallvec::SmallVec;

use crate::latch::Held;
use crate::page::{LeafNode, Node, Page};

/// Links stored inline; deeper trees spill to the heap.
const INLINE_LINKS: usize = 16;

/// Kind of operation a traversal is performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
	Read,
	Insert,
	Delete,
}

impl Access {
	/// Latches are taken in shared mode for reads only.
	#[inline]
	pub(crate) fn is_shared(self) -> bool {
		self == Access::Read
	}
}

/// One held latch.
pub(crate) enum Link<'g, V> {
	/// The latch on the tree's root pointer.
	Root(Held<'g, Atomic<Page<V>>>),
	/// A page latch. `slot` is the page's index in its parent, as seen when
	/// the page was reached.
	Page {
		page: &'g Page<V>,
		guard: Held<'g, Node<V>>,
		slot: usize,
	},
}

/// Where the parent of a chain entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Parent {
	/// The entry is the root page; the root latch is at this index.
	Root(usize),
	/// The parent page is latched at this index.
	Page(usize),
	/// The parent latch was released because the entry was safe.
	Released,
}

pub(crate) struct LatchChain<'g, V> {
	links: SmallVec<[Link<'g, V>; INLINE_LINKS]>,
}

impl<'g, V> LatchChain<'g, V> {
	pub(crate) fn new() -> LatchChain<'g, V> {
		LatchChain {
			links: SmallVec::new(),
		}
	}

	#[inline]
	pub(crate) fn push(&mut self, link: Link<'g, V>) {
		self.links.push(link);
	}

	/// Index of the deepest link.
	#[inline]
	pub(crate) fn last(&self) -> usize {
		self.links.len() - 1
	}

	/// Releases every latch except the most recently acquired one.
	pub(crate) fn release_ancestors(&mut self) {
		let keep = self.last();
		self.links.drain(..keep);
	}

	pub(crate) fn parent_of(&self, at: usize) -> Parent {
		if at == 0 {
			return Parent::Released;
		}
		match self.links[at - 1] {
			Link::Root(_) => Parent::Root(at - 1),
			Link::Page {
				..
			} => Parent::Page(at - 1),
		}
	}

	pub(crate) fn page(&self, at: usize) -> &'g Page<V> {
		match self.links[at] {
			Link::Page {
				page,
				..
			} => page,
			Link::Root(_) => unreachable!("root latch at chain index {at} is not a page"),
		}
	}

	pub(crate) fn slot(&self, at: usize) -> usize {
		match self.links[at] {
			Link::Page {
				slot,
				..
			} => slot,
			Link::Root(_) => unreachable!("root latch at chain index {at} has no slot"),
		}
	}

	pub(crate) fn node(&self, at: usize) -> &Node<V> {
		match &self.links[at] {
			Link::Page {
				guard,
				..
			} => &**guard,
			Link::Root(_) => unreachable!("root latch at chain index {at} is not a page"),
		}
	}

	pub(crate) fn node_mut(&mut self, at: usize) -> &mut Node<V> {
		match &mut self.links[at] {
			Link::Page {
				guard,
				..
			} => guard.as_mut(),
			Link::Root(_) => unreachable!("root latch at chain index {at} is not a page"),
		}
	}

	/// The node at `at` together with its parent's, both writable.
	pub(crate) fn parent_and_node_mut(&mut self, at: usize) -> (&mut Node<V>, &mut Node<V>) {
		let (above, below) = self.links.split_at_mut(at);
		match (above.last_mut(), below.first_mut()) {
			(
				Some(Link::Page {
					guard: parent,
					..
				}),
				Some(Link::Page {
					guard: node,
					..
				}),
			) => (parent.as_mut(), node.as_mut()),
			_ => unreachable!("chain index {at} has no latched parent page"),
		}
	}

	/// The root pointer, latched exclusively at `at`.
	pub(crate) fn root(&self, at: usize) -> &Atomic<Page<V>> {
		match &self.links[at] {
			Link::Root(guard) => {
				debug_assert!(guard.is_exclusive(), "root replaced under a shared latch");
				&**guard
			}
			Link::Page {
				..
			} => unreachable!("chain index {at} is not the root latch"),
		}
	}

	/// The leaf the traversal ended on.
	pub(crate) fn leaf(&self) -> &LeafNode<V> {
		self.node(self.last()).as_leaf()
	}

	pub(crate) fn leaf_mut(&mut self) -> &mut LeafNode<V> {
		let at = self.last();
		self.node_mut(at).as_leaf_mut()
	}
}

#[cfg(all(test, not(loom)))]
mod tests {
	use super::*;
	use crate::latch::Latch;

	fn leaf_page() -> Page<u64> {
		Page::new(Node::Leaf(LeafNode::new(4)))
	}

	#[test]
	fn release_keeps_only_the_deepest_latch() {
		let root = Latch::new(Atomic::null());
		let a = leaf_page();
		let b = leaf_page();
		let mut chain = LatchChain::new();
		chain.push(Link::Root(Held::acquire(&root, false)));
		chain.push(Link::Page {
			page: &a,
			guard: Held::acquire(&a.node, false),
			slot: 0,
		});
		chain.push(Link::Page {
			page: &b,
			guard: Held::acquire(&b.node, false),
			slot: 3,
		});
		assert_eq!(chain.parent_of(1), Parent::Root(0));
		assert_eq!(chain.parent_of(2), Parent::Page(1));

		chain.release_ancestors();
		assert_eq!(chain.last(), 0);
		assert_eq!(chain.parent_of(0), Parent::Released);
		assert_eq!(chain.slot(0), 3);
		assert!(std::ptr::eq(chain.page(0), &b));

		// Released latches can be taken again.
		drop(root.exclusive());
		drop(a.node.exclusive());
	}

	#[test]
	fn dropping_the_chain_releases_everything() {
		let a = leaf_page();
		{
			let mut chain = LatchChain::new();
			chain.push(Link::Page {
				page: &a,
				guard: Held::acquire(&a.node, false),
				slot: 0,
			});
			chain.leaf_mut().insert(1, 1);
			assert_eq!(chain.leaf().entries.len(), 1);
		}
		assert_eq!(a.node.shared().len(), 1);
	}

	#[test]
	fn parent_and_node_are_disjoint() {
		let a = leaf_page();
		let b = leaf_page();
		let mut chain = LatchChain::new();
		for page in [&a, &b] {
			chain.push(Link::Page {
				page,
				guard: Held::acquire(&page.node, false),
				slot: 0,
			});
		}
		let (parent, node) = chain.parent_and_node_mut(1);
		parent.as_leaf_mut().insert(1, 10);
		node.as_leaf_mut().insert(2, 20);
		assert_eq!(chain.node(0).as_leaf().get(1), Some(&10));
		assert_eq!(chain.node(1).as_leaf().get(2), Some(&20));
	}
}
