//! # Error Types for the Latch-Coupled B+ Tree
//!
//! The tree reports two kinds of expected outcomes as errors: a key that is
//! already present on insert and a key that is absent on lookup or remove.
//! Both are returned before anything is mutated, so the tree is unchanged
//! whenever an operation fails.
//!
//! Once a traversal holds its latches the view it sees is consistent, so a
//! failed match is a genuine absence rather than a race artifact and there
//! is nothing to retry.
//!
//! Broken structural invariants (unsorted keys, occupancy out of bounds, a
//! parent missing from the latch chain) are not errors: they indicate a bug
//! and are caught by assertions.

use thiserror::Error;

use crate::Key;

/// Errors returned by tree operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// The key is already present; the stored value was left untouched.
	#[error("key {0} already exists")]
	AlreadyExists(Key),

	/// The key is not present.
	#[error("key {0} not found")]
	NotFound(Key),

	/// The requested degree is too small to keep split and merged pages
	/// within their occupancy bounds.
	#[error("invalid degree {0}: a page must hold at least {min} entries", min = crate::config::MIN_DEGREE)]
	InvalidDegree(usize),
}

/// A Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;
