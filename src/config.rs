//! Tree configuration.
//!
//! The only tunable is the page degree: the maximum number of entries in a
//! leaf. Internal pages carry one extra slot for the sentinel child that
//! covers keys below the first separator, so they hold `degree + 1` children.

use crate::error::{Error, Result};

/// Default degree. A larger value reduces tree height but increases the cost
/// of shifting entries within a page and of splits and merges.
pub const DEFAULT_DEGREE: usize = 64;

/// Smallest degree for which a split always yields two pages at or above the
/// minimum occupancy and a borrow never drains its donor below it.
pub const MIN_DEGREE: usize = 3;

/// Configuration for a [`Tree`](crate::Tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
	/// Maximum number of entries in a leaf page.
	pub degree: usize,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			degree: DEFAULT_DEGREE,
		}
	}
}

impl Config {
	/// Creates a configuration with the given degree. The value is checked by
	/// [`Config::validate`] when the tree is built.
	pub fn new(degree: usize) -> Self {
		Config {
			degree,
		}
	}

	/// Checks that the degree is large enough to keep pages balanced.
	pub fn validate(&self) -> Result<()> {
		if self.degree < MIN_DEGREE {
			return Err(Error::InvalidDegree(self.degree));
		}
		Ok(())
	}

	/// Maximum entries in a leaf page.
	#[inline]
	pub(crate) fn leaf_capacity(&self) -> usize {
		self.degree
	}

	/// Maximum entries (children) in an internal page, sentinel included.
	#[inline]
	pub(crate) fn internal_capacity(&self) -> usize {
		self.degree + 1
	}

	/// Minimum entries in a non-root leaf page.
	#[inline]
	pub(crate) fn leaf_min(&self) -> usize {
		min_occupancy(self.leaf_capacity())
	}

	/// Minimum entries (children) in a non-root internal page.
	#[inline]
	pub(crate) fn internal_min(&self) -> usize {
		min_occupancy(self.internal_capacity())
	}
}

#[inline]
fn min_occupancy(capacity: usize) -> usize {
	(capacity - 1) / 2 + 1
}
