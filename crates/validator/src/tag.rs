use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::clock::{self, CONSTANT, INITIAL, Revision};
use crate::tracking;

static NEXT_TAG_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a [`Tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagId(u64);

impl TagId {
	/// Returns the raw identifier.
	pub const fn get(self) -> u64 {
		self.0
	}
}

struct TagCell {
	id: TagId,
	revision: AtomicU64,
}

/// Dirtyable marker for the last-changed revision of one piece of state.
///
/// Clones share identity: dirtying one clone is observed through all of them.
#[derive(Clone)]
pub struct Tag {
	cell: Arc<TagCell>,
}

impl Tag {
	/// Allocates a fresh tag at [`INITIAL`].
	pub fn new() -> Self {
		let id = TagId(NEXT_TAG_ID.fetch_add(1, Ordering::Relaxed));
		Self {
			cell: Arc::new(TagCell {
				id,
				revision: AtomicU64::new(INITIAL.get()),
			}),
		}
	}

	/// Returns this tag's identity.
	pub fn id(&self) -> TagId {
		self.cell.id
	}

	/// Returns the revision this tag last changed at.
	pub fn value(&self) -> Revision {
		Revision::from_raw(self.cell.revision.load(Ordering::Acquire))
	}

	/// Returns true if nothing changed since `snapshot`.
	pub fn validate(&self, snapshot: Revision) -> bool {
		self.value() <= snapshot
	}

	/// Stamps this tag with a new clock revision.
	pub fn dirty(&self) {
		let revision = clock::bump();
		self.cell.revision.store(revision.get(), Ordering::Release);
		tracing::trace!(tag = self.cell.id.0, %revision, "validator.dirty");
	}

	/// Records a read of this tag in the active tracking frame, if any.
	pub fn consume(&self) {
		tracking::consume_tag(self);
	}

	/// Returns true if both handles share identity.
	pub fn ptr_eq(&self, other: &Tag) -> bool {
		Arc::ptr_eq(&self.cell, &other.cell)
	}
}

impl Default for Tag {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tag").field("id", &self.cell.id.0).field("revision", &self.value()).finish()
	}
}

/// The tags consumed during one tracking frame.
///
/// Its value is the newest member revision, so it validates only while every
/// member does.
#[derive(Clone, Default)]
pub struct CombinedTag {
	tags: SmallVec<[Tag; 4]>,
}

impl CombinedTag {
	/// Combines `tags`, keeping one entry per identity.
	pub fn combine<I>(tags: I) -> Self
	where
		I: IntoIterator<Item = Tag>,
	{
		let mut combined = Self::default();
		for tag in tags {
			combined.insert(tag);
		}
		combined
	}

	pub(crate) fn insert(&mut self, tag: Tag) {
		if !self.tags.iter().any(|t| t.ptr_eq(&tag)) {
			self.tags.push(tag);
		}
	}

	/// Returns the newest member revision, or [`CONSTANT`] when empty.
	pub fn value(&self) -> Revision {
		self.tags.iter().map(Tag::value).max().unwrap_or(CONSTANT)
	}

	/// Returns true if no member changed since `snapshot`.
	pub fn validate(&self, snapshot: Revision) -> bool {
		self.tags.iter().all(|tag| tag.validate(snapshot))
	}

	/// Re-records every member in the active tracking frame.
	pub fn consume(&self) {
		for tag in &self.tags {
			tag.consume();
		}
	}

	/// Returns the number of distinct member tags.
	pub fn len(&self) -> usize {
		self.tags.len()
	}

	/// Returns true when no tag was consumed, i.e. the combination never invalidates.
	pub fn is_empty(&self) -> bool {
		self.tags.is_empty()
	}

	/// Returns true if `tag` is a member.
	pub fn contains(&self, tag: &Tag) -> bool {
		self.tags.iter().any(|t| t.ptr_eq(tag))
	}
}

impl fmt::Debug for CombinedTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.tags.iter().map(|t| t.cell.id.0)).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fresh_tag_starts_at_initial_and_validates() {
		let tag = Tag::new();
		assert_eq!(tag.value(), INITIAL);
		assert!(tag.validate(clock::current()));
	}

	#[test]
	fn dirty_invalidates_older_snapshots() {
		let tag = Tag::new();
		let snapshot = clock::current();
		tag.dirty();
		assert!(!tag.validate(snapshot));
		assert!(tag.validate(clock::current()));
	}

	#[test]
	fn consume_does_not_change_revision() {
		let tag = Tag::new();
		tag.dirty();
		let before = tag.value();
		let ((), _) = crate::track(|| {
			tag.consume();
			tag.consume();
		});
		assert_eq!(tag.value(), before);
	}

	#[test]
	fn combined_value_is_newest_member() {
		let a = Tag::new();
		let b = Tag::new();
		b.dirty();
		let combined = CombinedTag::combine([a.clone(), b.clone(), a.clone()]);
		assert_eq!(combined.len(), 2);
		assert_eq!(combined.value(), b.value());
	}

	#[test]
	fn empty_combination_is_constant() {
		let combined = CombinedTag::default();
		assert!(combined.is_empty());
		assert_eq!(combined.value(), CONSTANT);
		assert!(combined.validate(CONSTANT));
	}

	#[test]
	fn clones_share_identity() {
		let tag = Tag::new();
		let other = tag.clone();
		let snapshot = clock::current();
		other.dirty();
		assert!(!tag.validate(snapshot));
		assert_eq!(tag.id(), other.id());
	}
}
