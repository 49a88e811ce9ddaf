/// Named run-loop queues, drained in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Queue {
	/// State changes and invalidation, e.g. dirtying tags.
	Actions,
	/// Work that reads invalidated state to produce output.
	Render,
	/// Work that must observe the result of rendering.
	AfterRender,
	/// Final teardown transitions.
	Destroy,
}

pub(crate) const QUEUE_COUNT: usize = 4;

impl Queue {
	/// All queues in flush order.
	pub const ALL: [Queue; QUEUE_COUNT] = [Queue::Actions, Queue::Render, Queue::AfterRender, Queue::Destroy];

	pub(crate) const fn index(self) -> usize {
		match self {
			Self::Actions => 0,
			Self::Render => 1,
			Self::AfterRender => 2,
			Self::Destroy => 3,
		}
	}

	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Actions => "actions",
			Self::Render => "render",
			Self::AfterRender => "after_render",
			Self::Destroy => "destroy",
		}
	}
}

/// De-duplication key for [`crate::RunLoop::schedule_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey {
	namespace: &'static str,
	id: u64,
}

impl TaskKey {
	/// Creates a key from a namespace and an identifier unique within it.
	pub const fn new(namespace: &'static str, id: u64) -> Self {
		Self { namespace, id }
	}

	/// Returns the namespace.
	pub const fn namespace(&self) -> &'static str {
		self.namespace
	}

	/// Returns the identifier.
	pub const fn id(&self) -> u64 {
		self.id
	}
}
