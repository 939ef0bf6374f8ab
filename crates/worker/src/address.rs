use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

/// Hierarchical identifier of a message destination.
///
/// Objects on their own thread are addressed as `[id]`; members of a
/// thread-dispatch group as `[group, id]`. Equality and ordering compare the
/// whole path.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address {
	path: SmallVec<[u64; 2]>,
}

impl Address {
	/// The address nothing lives at. Messages sent here are dropped.
	pub const NONE: Address = Address { path: SmallVec::new_const() };

	/// Creates a top-level address.
	pub fn root(id: u64) -> Self {
		let mut path = SmallVec::new();
		path.push(id);
		Self { path }
	}

	/// Creates an address nested under `self`.
	#[must_use]
	pub fn child(&self, id: u64) -> Self {
		let mut path = self.path.clone();
		path.push(id);
		Self { path }
	}

	/// Final path segment, unique among siblings.
	pub fn last(&self) -> Option<u64> {
		self.path.last().copied()
	}

	pub fn segments(&self) -> &[u64] {
		&self.path
	}

	pub fn is_none(&self) -> bool {
		self.path.is_empty()
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.path.is_empty() {
			return f.write_str("<none>");
		}
		f.write_str("<")?;
		for (index, segment) in self.path.iter().enumerate() {
			if index > 0 {
				f.write_str(".")?;
			}
			write!(f, "{segment:x}")?;
		}
		f.write_str(">")
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

/// Allocator of unique address segments for one runtime.
#[derive(Debug)]
pub(crate) struct AddressSpace {
	next: AtomicU64,
}

impl AddressSpace {
	pub fn new() -> Self {
		Self { next: AtomicU64::new(1) }
	}

	/// Returns a segment never handed out before by this space.
	pub fn allocate(&self) -> u64 {
		self.next.fetch_add(1, Ordering::Relaxed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn child_extends_path() {
		let group = Address::root(7);
		let member = group.child(9);
		assert_eq!(member.segments(), &[7, 9]);
		assert_eq!(member.last(), Some(9));
		assert_ne!(member, Address::root(9));
	}

	#[test]
	fn none_is_empty_and_displays() {
		assert!(Address::NONE.is_none());
		assert_eq!(Address::NONE.last(), None);
		assert_eq!(Address::NONE.to_string(), "<none>");
		assert_eq!(Address::root(255).child(16).to_string(), "<ff.10>");
	}

	#[test]
	fn allocation_is_unique() {
		let space = AddressSpace::new();
		let a = space.allocate();
		let b = space.allocate();
		assert_ne!(a, b);
		assert!(a > 0);
	}
}
