use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A point on the global revision clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

/// Revision of state that never changes.
pub const CONSTANT: Revision = Revision(0);

/// Revision every fresh tag starts at.
pub const INITIAL: Revision = Revision(1);

static CLOCK: AtomicU64 = AtomicU64::new(INITIAL.0);

impl Revision {
	/// Returns the raw counter value.
	pub const fn get(self) -> u64 {
		self.0
	}

	pub(crate) const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}
}

impl fmt::Display for Revision {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "r{}", self.0)
	}
}

/// Returns the latest revision handed out by the clock.
pub fn current() -> Revision {
	Revision(CLOCK.load(Ordering::Acquire))
}

/// Advances the clock and returns the new revision.
pub(crate) fn bump() -> Revision {
	Revision(CLOCK.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
}
