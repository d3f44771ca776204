//! Reader-writer latch guarding a single page or the root pointer.
//!
//! A [`Latch`] couples a blocking reader-writer lock with the data it protects.
//! Unlike a plain `RwLock<T>`, the guards keep a reference to the latch they
//! came from so the latch chain can tell which latch a guard belongs to, and
//! so that a page can be reached again from the guard held on it.
//!
//! Latches are short-duration: they are held for the span of one tree
//! operation and are always acquired top-down (root latch, then pages from
//! root to leaf, then at most one sibling). See the crate documentation for
//! the full ordering rules.

use crate::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, UnsafeCell};

/// A reader-writer latch that owns the data it protects.
pub struct Latch<T> {
	lock: RwLock<()>,
	data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Latch<T> {}
unsafe impl<T: Send + Sync> Sync for Latch<T> {}

impl<T> Latch<T> {
	/// Creates a new, unlocked `Latch<T>`.
	#[inline]
	pub fn new(data: T) -> Latch<T> {
		Latch {
			lock: RwLock::new(()),
			data: UnsafeCell::new(data),
		}
	}

	/// Locks this latch with exclusive write access, blocking the thread until
	/// it can be acquired.
	///
	/// Returns an RAII guard which releases the exclusive access when dropped.
	#[inline]
	pub fn exclusive(&self) -> ExclusiveGuard<'_, T> {
		let guard = self.lock.write();
		ExclusiveGuard {
			latch: self,
			_guard: guard,
			data: self.data.get(),
		}
	}

	/// Locks this latch with shared read access, blocking the thread until it
	/// can be acquired.
	///
	/// Returns an RAII guard which releases the shared access when dropped.
	#[inline]
	pub fn shared(&self) -> SharedGuard<'_, T> {
		let guard = self.lock.read();
		SharedGuard {
			latch: self,
			_guard: guard,
			data: self.data.get(),
		}
	}

	/// Mutable access without locking, for when the latch is uniquely owned.
	#[inline]
	pub fn get_mut(&mut self) -> &mut T {
		// SAFETY: `&mut self` proves no guard is alive.
		unsafe { &mut *self.data.get() }
	}
}

/// RAII structure used to release the exclusive write access of a latch when dropped.
pub struct ExclusiveGuard<'a, T> {
	latch: &'a Latch<T>,
	_guard: RwLockWriteGuard<'a, ()>,
	data: *mut T,
}

unsafe impl<'a, T: Sync> Sync for ExclusiveGuard<'a, T> {}

impl<'a, T> ExclusiveGuard<'a, T> {
	/// Returns a reference to the latch this guard was taken on.
	#[inline]
	pub fn latch(&self) -> &'a Latch<T> {
		self.latch
	}
}

impl<'a, T> std::ops::Deref for ExclusiveGuard<'a, T> {
	type Target = T;

	#[inline]
	fn deref(&self) -> &T {
		// SAFETY: the write lock is held for the lifetime of the guard.
		unsafe { &*self.data }
	}
}

impl<'a, T> std::ops::DerefMut for ExclusiveGuard<'a, T> {
	#[inline]
	fn deref_mut(&mut self) -> &mut T {
		// SAFETY: the write lock is held for the lifetime of the guard.
		unsafe { &mut *self.data }
	}
}

/// RAII structure used to release the shared read access of a latch when dropped.
pub struct SharedGuard<'a, T> {
	latch: &'a Latch<T>,
	_guard: RwLockReadGuard<'a, ()>,
	data: *const T,
}

unsafe impl<'a, T: Sync> Sync for SharedGuard<'a, T> {}

impl<'a, T> SharedGuard<'a, T> {
	/// Returns a reference to the latch this guard was taken on.
	#[inline]
	pub fn latch(&self) -> &'a Latch<T> {
		self.latch
	}
}

impl<'a, T> std::ops::Deref for SharedGuard<'a, T> {
	type Target = T;

	#[inline]
	fn deref(&self) -> &T {
		// SAFETY: the read lock is held for the lifetime of the guard.
		unsafe { &*self.data }
	}
}

/// A guard held in either mode.
///
/// The latch chain stores one of these per latched level; read traversals
/// hold shared guards, insert and delete traversals hold exclusive ones.
pub enum Held<'a, T> {
	Shared(SharedGuard<'a, T>),
	Exclusive(ExclusiveGuard<'a, T>),
}

impl<'a, T> Held<'a, T> {
	/// Acquires `latch` in shared mode when `shared` is set, exclusively otherwise.
	#[inline]
	pub fn acquire(latch: &'a Latch<T>, shared: bool) -> Held<'a, T> {
		if shared {
			Held::Shared(latch.shared())
		} else {
			Held::Exclusive(latch.exclusive())
		}
	}

	/// Returns `true` if this guard grants write access.
	#[inline]
	pub fn is_exclusive(&self) -> bool {
		matches!(self, Held::Exclusive(_))
	}

	/// Returns a reference to the latch this guard was taken on.
	#[inline]
	pub fn latch(&self) -> &'a Latch<T> {
		match self {
			Held::Shared(g) => g.latch(),
			Held::Exclusive(g) => g.latch(),
		}
	}

	/// Mutable access to the latched data.
	///
	/// # Panics
	///
	/// Panics if the guard is shared: mutating through a read latch would
	/// break the page latch protocol.
	#[inline]
	pub fn as_mut(&mut self) -> &mut T {
		match self {
			Held::Exclusive(g) => g,
			Held::Shared(_) => panic!("write access requested through a shared latch"),
		}
	}
}

impl<'a, T> std::ops::Deref for Held<'a, T> {
	type Target = T;

	#[inline]
	fn deref(&self) -> &T {
		match self {
			Held::Shared(g) => g,
			Held::Exclusive(g) => g,
		}
	}
}
