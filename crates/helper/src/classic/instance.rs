use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use trellis_destroyable::{DestroyState, Destroyable};
use trellis_manager::{Arguments, HelperError, HelperResult};
use trellis_owner::OwnerInjection;
use trellis_runloop::{RunLoop, RunLoopError};
use trellis_validator::Tag;

use super::{ClassicHelperDefinition, Helper, HelperContext, RecomputeHandle};

/// Lifecycle of a [`HelperInstance`], mirroring its destroyable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
	Created,
	Destroying,
	Destroyed,
}

/// One live stateful producer with its recompute tag and destroyable.
pub struct HelperInstance {
	name: String,
	helper: Arc<Mutex<Box<dyn Helper>>>,
	recompute: RecomputeHandle,
	destroyable: Destroyable,
}

impl HelperInstance {
	pub(crate) fn create(definition: &ClassicHelperDefinition, injection: &OwnerInjection, run_loop: &RunLoop) -> Result<Self, HelperError> {
		let class = definition.class();
		let recompute = RecomputeHandle::new(run_loop.clone());
		let helper = match definition {
			ClassicHelperDefinition::Class(class) => class.construct(HelperContext {
				owner: injection.owner().cloned(),
				recompute: recompute.clone(),
			}),
			ClassicHelperDefinition::Factory(factory) => {
				let mut helper = factory.class().construct(HelperContext {
					owner: None,
					recompute: recompute.clone(),
				});
				helper.inject(factory.owner());
				helper
			}
		};
		let helper = Arc::new(Mutex::new(helper));

		let destroyable = Destroyable::new(class.name());
		{
			let helper = Arc::clone(&helper);
			let recompute = recompute.clone();
			let name = class.name().to_owned();
			destroyable.register_destructor(move || {
				recompute.retire();
				helper.lock().will_destroy();
				tracing::debug!(helper = %name, "helper.destroy");
			})?;
		}

		tracing::debug!(helper = class.name(), tag = recompute.tag().id().get(), "helper.instantiate");
		Ok(Self {
			name: class.name().to_owned(),
			helper,
			recompute,
			destroyable,
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn state(&self) -> HelperState {
		match self.destroyable.state() {
			DestroyState::Live => HelperState::Created,
			DestroyState::Destroying => HelperState::Destroying,
			DestroyState::Destroyed => HelperState::Destroyed,
		}
	}

	/// Runs the producer's `compute` against `args`.
	///
	/// Fails with [`HelperError::Destroyed`] once destruction has started.
	pub fn compute(&self, args: &Arguments) -> HelperResult {
		if self.destroyable.is_destroying() {
			return Err(HelperError::Destroyed { name: self.name.clone() });
		}
		tracing::trace!(helper = %self.name, "helper.compute");
		Ok(self.helper.lock().compute(&args.positional, &args.named)?)
	}

	/// See [`RecomputeHandle::recompute`].
	pub fn recompute(&self) -> Result<(), RunLoopError> {
		self.recompute.recompute()
	}

	pub fn recompute_handle(&self) -> &RecomputeHandle {
		&self.recompute
	}

	pub fn recompute_tag(&self) -> &Tag {
		self.recompute.tag()
	}

	pub fn destroyable(&self) -> &Destroyable {
		&self.destroyable
	}

	/// Starts teardown in the current batch, opening one if needed.
	pub fn destroy(&self, run_loop: &RunLoop) -> Result<(), RunLoopError> {
		self.destroyable.destroy(run_loop)
	}
}

impl fmt::Debug for HelperInstance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HelperInstance")
			.field("name", &self.name)
			.field("state", &self.state())
			.field("recompute", &self.recompute)
			.finish()
	}
}
