//! Deterministic teardown for producer instances and anything they own.
//!
//! A [`Destroyable`] moves `Live → Destroying → Destroyed`. Destroying marks
//! the node and its children immediately, then schedules destructors on the
//! run loop's `actions` queue and the final transition on its `destroy` queue,
//! so teardown observes the same batching as every other state change.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use trellis_runloop::{Queue, RunLoop, RunLoopError};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle position of a [`Destroyable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyState {
	Live,
	Destroying,
	Destroyed,
}

/// Handle returned by [`Destroyable::register_destructor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestructorId(u64);

/// Lifecycle misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DestroyableError {
	#[error("{label} is already being destroyed")]
	Destroying { label: String },
	#[error("{label} cannot be associated with itself")]
	SelfAssociation { label: String },
}

type Destructor = Box<dyn FnOnce() + Send + 'static>;

struct Node {
	label: String,
	state: DestroyState,
	destructors: Vec<(DestructorId, Destructor)>,
	children: Vec<Destroyable>,
}

/// Shared teardown handle. Clones refer to the same node.
#[derive(Clone)]
pub struct Destroyable {
	id: u64,
	node: Arc<Mutex<Node>>,
}

impl fmt::Debug for Destroyable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let node = self.node.lock();
		f.debug_struct("Destroyable")
			.field("id", &self.id)
			.field("label", &node.label)
			.field("state", &node.state)
			.field("children", &node.children.len())
			.finish()
	}
}

impl PartialEq for Destroyable {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.node, &other.node)
	}
}

impl Eq for Destroyable {}

impl Destroyable {
	/// Creates a live node.
	pub fn new(label: impl Into<String>) -> Self {
		Self {
			id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
			node: Arc::new(Mutex::new(Node {
				label: label.into(),
				state: DestroyState::Live,
				destructors: Vec::new(),
				children: Vec::new(),
			})),
		}
	}

	/// Returns the diagnostic label.
	pub fn label(&self) -> String {
		self.node.lock().label.clone()
	}

	/// Returns the current lifecycle position.
	pub fn state(&self) -> DestroyState {
		self.node.lock().state
	}

	/// Returns true once destruction has started, including after it finished.
	pub fn is_destroying(&self) -> bool {
		self.state() != DestroyState::Live
	}

	/// Returns true once every destructor has run.
	pub fn is_destroyed(&self) -> bool {
		self.state() == DestroyState::Destroyed
	}

	/// Adds a destructor, run in registration order on destroy.
	pub fn register_destructor<F>(&self, destructor: F) -> Result<DestructorId, DestroyableError>
	where
		F: FnOnce() + Send + 'static,
	{
		let mut node = self.node.lock();
		if node.state != DestroyState::Live {
			return Err(DestroyableError::Destroying { label: node.label.clone() });
		}
		let id = DestructorId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
		node.destructors.push((id, Box::new(destructor)));
		Ok(id)
	}

	/// Removes a destructor that has not run yet. Returns true if it was found.
	pub fn unregister_destructor(&self, id: DestructorId) -> bool {
		let mut node = self.node.lock();
		let before = node.destructors.len();
		node.destructors.retain(|(existing, _)| *existing != id);
		node.destructors.len() != before
	}

	/// Ties `child`'s lifetime to this node: destroying `self` destroys `child` first.
	pub fn associate_child(&self, child: &Destroyable) -> Result<(), DestroyableError> {
		if self == child {
			return Err(DestroyableError::SelfAssociation { label: self.label() });
		}
		let mut node = self.node.lock();
		if node.state != DestroyState::Live {
			return Err(DestroyableError::Destroying { label: node.label.clone() });
		}
		if !node.children.contains(child) {
			node.children.push(child.clone());
		}
		Ok(())
	}

	/// Starts destruction inside the current batch, opening one if needed.
	///
	/// Calling this on a node that is already destroying is a no-op.
	pub fn destroy(&self, run_loop: &RunLoop) -> Result<(), RunLoopError> {
		run_loop.join(|| self.schedule_teardown(run_loop))
	}

	fn schedule_teardown(&self, run_loop: &RunLoop) {
		let (label, children, destructors) = {
			let mut node = self.node.lock();
			if node.state != DestroyState::Live {
				return;
			}
			node.state = DestroyState::Destroying;
			(node.label.clone(), std::mem::take(&mut node.children), std::mem::take(&mut node.destructors))
		};
		tracing::debug!(id = self.id, label = %label, children = children.len(), destructors = destructors.len(), "destroyable.destroy");

		for child in &children {
			child.schedule_teardown(run_loop);
		}
		for (_, destructor) in destructors {
			run_loop.schedule(Queue::Actions, destructor);
		}
		let node = Arc::clone(&self.node);
		run_loop.schedule(Queue::Destroy, move || {
			node.lock().state = DestroyState::Destroyed;
		});
	}
}
