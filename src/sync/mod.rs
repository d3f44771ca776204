//! Lock and cell primitives with loom support.
//!
//! Under normal compilation these are re-exports from `parking_lot` and `std`.
//! Under `cfg(loom)` they are thin wrappers over loom's equivalents so the
//! latch can be model checked.
//!
//! Import from this module instead of from `parking_lot` directly:
//!
//! ```ignore
//! use crate::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, UnsafeCell};
//! ```

// ===========================================================================
// RwLock
// ===========================================================================

// parking_lot guards are plain RAII values while loom wraps acquisition in
// `LockResult`, so the loom side gets a wrapper with parking_lot's shape.

#[cfg(not(loom))]
pub use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(loom)]
mod loom_rwlock {
	use loom::sync::{
		RwLock as LoomRwLock, RwLockReadGuard as LoomReadGuard, RwLockWriteGuard as LoomWriteGuard,
	};

	/// A loom `RwLock` exposing the parking_lot API.
	pub struct RwLock<T>(LoomRwLock<T>);

	impl<T> RwLock<T> {
		pub fn new(value: T) -> Self {
			RwLock(LoomRwLock::new(value))
		}

		pub fn read(&self) -> RwLockReadGuard<'_, T> {
			RwLockReadGuard(self.0.read().unwrap())
		}

		pub fn write(&self) -> RwLockWriteGuard<'_, T> {
			RwLockWriteGuard(self.0.write().unwrap())
		}
	}

	pub struct RwLockReadGuard<'a, T>(LoomReadGuard<'a, T>);

	impl<'a, T> std::ops::Deref for RwLockReadGuard<'a, T> {
		type Target = T;
		fn deref(&self) -> &T {
			&self.0
		}
	}

	pub struct RwLockWriteGuard<'a, T>(LoomWriteGuard<'a, T>);

	impl<'a, T> std::ops::Deref for RwLockWriteGuard<'a, T> {
		type Target = T;
		fn deref(&self) -> &T {
			&self.0
		}
	}

	impl<'a, T> std::ops::DerefMut for RwLockWriteGuard<'a, T> {
		fn deref_mut(&mut self) -> &mut T {
			&mut self.0
		}
	}
}

#[cfg(loom)]
pub use loom_rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// ===========================================================================
// UnsafeCell
// ===========================================================================

// loom's `UnsafeCell::get` hands out a tracked `ConstPtr`, so the loom side
// unwraps it back into a raw pointer to keep the std signature.

#[cfg(not(loom))]
pub use std::cell::UnsafeCell;

#[cfg(loom)]
mod loom_unsafe_cell {
	use loom::cell::UnsafeCell as LoomUnsafeCell;

	pub struct UnsafeCell<T>(LoomUnsafeCell<T>);

	impl<T> UnsafeCell<T> {
		pub fn new(value: T) -> Self {
			UnsafeCell(LoomUnsafeCell::new(value))
		}

		/// Raw pointer to the contents. Callers synchronise access themselves.
		pub fn get(&self) -> *mut T {
			// SAFETY: the pointer escapes loom's tracking; the latch that owns
			// this cell serialises every access through its RwLock.
			unsafe { self.0.get().deref() as *const T as *mut T }
		}
	}
}

#[cfg(loom)]
pub use loom_unsafe_cell::UnsafeCell;
