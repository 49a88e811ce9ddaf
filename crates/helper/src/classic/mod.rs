//! Stateful producers.
//!
//! A [`Helper`] is built once per state bucket from a [`HelperClass`] and
//! lives until its bucket's destroyable is torn down. Each instance owns one
//! recompute tag; [`RecomputeHandle::recompute`] dirties it through the run
//! loop so every request made during one batch lands as a single
//! invalidation.

mod instance;
mod manager;


use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use trellis_manager::{BaseTypeId, ComputeError, HelperDefinition, ManagerTarget, NamedArgs, Value};
use trellis_owner::{FactoryManager, Owner};
use trellis_runloop::{Queue, RunLoop, RunLoopError, TaskKey};
use trellis_validator::Tag;

pub use instance::{HelperInstance, HelperState};
pub use manager::ClassicHelperManager;

/// A stateful producer.
pub trait Helper: Send + 'static {
	/// Computes the current value from the call site's arguments.
	fn compute(&mut self, positional: &[Value], named: &NamedArgs) -> Result<Value, ComputeError>;

	/// Receives the owner when the container builds the instance from a
	/// registered factory.
	fn inject(&mut self, _owner: &Owner) {}

	/// Runs once when the instance's destroyable tears down.
	fn will_destroy(&mut self) {}
}

type Constructor = dyn Fn(HelperContext) -> Box<dyn Helper> + Send + Sync;

/// A named constructor for one kind of [`Helper`].
#[derive(Clone)]
pub struct HelperClass {
	name: Arc<str>,
	construct: Arc<Constructor>,
}

impl HelperClass {
	pub fn new<H, F>(name: impl Into<Arc<str>>, construct: F) -> Self
	where
		H: Helper,
		F: Fn(HelperContext) -> H + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			construct: Arc::new(move |cx| Box::new(construct(cx)) as Box<dyn Helper>),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	fn construct(&self, cx: HelperContext) -> Box<dyn Helper> {
		(self.construct)(cx)
	}
}

impl fmt::Debug for HelperClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("HelperClass").field(&self.name).finish()
	}
}

/// Marker base type shared by every stateful producer definition.
pub enum ClassicHelperKind {}

/// Payload of a stateful producer definition.
#[derive(Clone, Debug)]
pub enum ClassicHelperDefinition {
	/// A bare class: instances get the manager's owner injection.
	Class(HelperClass),
	/// A class resolved through the container: instances are built without an
	/// injected owner and receive it through [`Helper::inject`].
	Factory(FactoryManager<HelperClass>),
}

impl ClassicHelperDefinition {
	pub fn class(&self) -> &HelperClass {
		match self {
			Self::Class(class) => class,
			Self::Factory(factory) => factory.class(),
		}
	}
}

/// Defines a stateful producer from a bare class.
pub fn classic_helper(class: HelperClass) -> HelperDefinition {
	HelperDefinition::with_base::<ClassicHelperKind, _>(ClassicHelperDefinition::Class(class))
}

/// Defines a stateful producer from a container-bound factory.
pub fn factory_helper(factory: FactoryManager<HelperClass>) -> HelperDefinition {
	HelperDefinition::with_base::<ClassicHelperKind, _>(ClassicHelperDefinition::Factory(factory))
}

/// The registry target every stateful producer definition resolves through.
pub fn classic_helper_target() -> ManagerTarget {
	ManagerTarget::Base(BaseTypeId::of::<ClassicHelperKind>())
}

/// Returns true if `definition` is a stateful producer definition.
pub fn is_classic_helper(definition: &HelperDefinition) -> bool {
	definition.is::<ClassicHelperDefinition>()
}

/// What a [`HelperClass`] constructor receives.
pub struct HelperContext {
	owner: Option<Owner>,
	recompute: RecomputeHandle,
}

impl HelperContext {
	/// The injected owner. `None` for factory-built instances, which get the
	/// owner through [`Helper::inject`] instead.
	pub fn owner(&self) -> Option<&Owner> {
		self.owner.as_ref()
	}

	pub fn recompute_handle(&self) -> RecomputeHandle {
		self.recompute.clone()
	}
}

/// Forces the owning instance to recompute on its next read.
#[derive(Clone)]
pub struct RecomputeHandle {
	tag: Tag,
	run_loop: RunLoop,
	live: Arc<AtomicBool>,
}

impl RecomputeHandle {
	fn new(run_loop: RunLoop) -> Self {
		Self {
			tag: Tag::new(),
			run_loop,
			live: Arc::new(AtomicBool::new(true)),
		}
	}

	/// Schedules a dirty of the recompute tag in the current batch, opening
	/// one if needed. Repeated calls before the batch flushes coalesce.
	///
	/// Ignored once the instance has been destroyed.
	pub fn recompute(&self) -> Result<(), RunLoopError> {
		if !self.live.load(Ordering::Acquire) {
			tracing::trace!(tag = self.tag.id().get(), "helper.recompute_ignored");
			return Ok(());
		}
		let key = TaskKey::new("helper.recompute", self.tag.id().get());
		self.run_loop.join(|| {
			let tag = self.tag.clone();
			self.run_loop.schedule_once(Queue::Actions, key, move || tag.dirty());
		})
	}

	/// The instance's recompute tag.
	pub fn tag(&self) -> &Tag {
		&self.tag
	}

	fn retire(&self) {
		self.live.store(false, Ordering::Release);
	}
}

impl fmt::Debug for RecomputeHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RecomputeHandle")
			.field("tag", &self.tag)
			.field("live", &self.live.load(Ordering::Relaxed))
			.finish()
	}
}
