//! Revision tags for fine-grained invalidation.
//!
//! A [`Tag`] records the revision at which a piece of state last changed.
//! Writers call [`Tag::dirty`], readers call [`Tag::consume`] (or
//! [`consume_tag`]) while a tracking frame opened by [`track`] is active. The
//! frame yields a [`CombinedTag`] that a host later validates against the
//! revision snapshot it took, deciding whether the computation must re-run.
//!
//! Consuming never mutates a tag. Dirtying bumps the process-wide clock and
//! stamps the tag with the new revision.

/// Process-wide revision clock.
pub mod clock;
/// Dirtyable tags and their combinations.
pub mod tag;
/// Thread-local tracking frames.
pub mod tracking;

pub use clock::{CONSTANT, INITIAL, Revision, current};
pub use tag::{CombinedTag, Tag, TagId};
pub use tracking::{consume_tag, is_tracking, track, untrack};

/// Creates a fresh dirtyable tag.
pub fn create_tag() -> Tag {
	Tag::new()
}

/// Marks `tag` as changed at a new revision.
pub fn dirty_tag(tag: &Tag) {
	tag.dirty();
}
