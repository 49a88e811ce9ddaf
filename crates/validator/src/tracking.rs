use std::cell::RefCell;

use crate::tag::{CombinedTag, Tag};

enum Frame {
	Tracking(CombinedTag),
	Untracked,
}

thread_local! {
	static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops the frame it pushed, including on unwind.
struct FrameGuard {
	depth: usize,
}

impl FrameGuard {
	fn push(frame: Frame) -> Self {
		let depth = FRAMES.with(|frames| {
			let mut frames = frames.borrow_mut();
			frames.push(frame);
			frames.len()
		});
		Self { depth }
	}

	fn finish(self) -> Option<CombinedTag> {
		let frame = FRAMES.with(|frames| {
			let mut frames = frames.borrow_mut();
			debug_assert_eq!(frames.len(), self.depth, "tracking frames must be popped in order");
			frames.pop()
		});
		std::mem::forget(self);
		match frame {
			Some(Frame::Tracking(tags)) => Some(tags),
			_ => None,
		}
	}
}

impl Drop for FrameGuard {
	fn drop(&mut self) {
		FRAMES.with(|frames| {
			let mut frames = frames.borrow_mut();
			frames.truncate(self.depth.saturating_sub(1));
		});
	}
}

/// Runs `f` in a fresh tracking frame and returns the tags it consumed.
///
/// Frames do not leak into their parent: a caller that caches the result is
/// responsible for re-consuming the returned [`CombinedTag`].
pub fn track<R>(f: impl FnOnce() -> R) -> (R, CombinedTag) {
	let guard = FrameGuard::push(Frame::Tracking(CombinedTag::default()));
	let result = f();
	let tags = guard.finish().unwrap_or_default();
	(result, tags)
}

/// Runs `f` with consumption suppressed.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
	let guard = FrameGuard::push(Frame::Untracked);
	let result = f();
	let _ = guard.finish();
	result
}

/// Records that the current computation read `tag`.
///
/// A no-op outside of any tracking frame.
pub fn consume_tag(tag: &Tag) {
	FRAMES.with(|frames| {
		if let Some(Frame::Tracking(tags)) = frames.borrow_mut().last_mut() {
			tags.insert(tag.clone());
		}
	});
}

/// Returns true when reads are currently being recorded.
pub fn is_tracking() -> bool {
	FRAMES.with(|frames| matches!(frames.borrow().last(), Some(Frame::Tracking(_))))
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn track_collects_consumed_tags() {
		let a = Tag::new();
		let b = Tag::new();
		let (value, tags) = track(|| {
			a.consume();
			b.consume();
			a.consume();
			7
		});
		assert_eq!(value, 7);
		assert_eq!(tags.len(), 2);
		assert!(tags.contains(&a));
		assert!(tags.contains(&b));
	}

	#[test]
	fn nested_frames_do_not_leak_into_parent() {
		let outer = Tag::new();
		let inner = Tag::new();
		let ((), parent) = track(|| {
			outer.consume();
			let ((), child) = track(|| inner.consume());
			assert!(child.contains(&inner));
		});
		assert!(parent.contains(&outer));
		assert!(!parent.contains(&inner));
	}

	#[test]
	fn untrack_suppresses_consumption() {
		let tag = Tag::new();
		let ((), tags) = track(|| {
			untrack(|| {
				assert!(!is_tracking());
				tag.consume();
			});
			assert!(is_tracking());
		});
		assert!(tags.is_empty());
	}

	#[test]
	fn consume_outside_frame_is_noop() {
		let tag = Tag::new();
		assert!(!is_tracking());
		consume_tag(&tag);
	}

	#[test]
	fn frame_is_popped_on_panic() {
		let tag = Tag::new();
		let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
			let _: ((), CombinedTag) = track(|| {
				tag.consume();
				panic!("compute failed");
			});
		}));
		assert!(result.is_err());
		assert!(!is_tracking());
	}
}
