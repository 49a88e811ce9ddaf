use std::fmt;
use std::sync::Arc;

use trellis_destroyable::Destroyable;
use trellis_owner::Owner;
use trellis_runloop::RunLoop;
use trellis_validator::{CombinedTag, Revision, current, track};

use crate::args::{Arguments, CapturedArgs};
use crate::definition::HelperDefinition;
use crate::error::{HelperError, HelperResult};
use crate::manager::{ManagerShape, ResolvedManager, StateBucket};
use crate::registry::ManagerRegistry;

/// Tags consumed by the last successful read and the revision it was taken at.
#[derive(Debug, Clone)]
struct LastRead {
	tags: CombinedTag,
	snapshot: Revision,
}

/// One call site's view of a producer: resolve, create, then read repeatedly.
pub struct HelperInvocation {
	definition: HelperDefinition,
	manager: Arc<ResolvedManager>,
	args: CapturedArgs,
	bucket: StateBucket,
	last: Option<LastRead>,
}

impl HelperInvocation {
	/// Resolves the manager for `definition` and creates its state bucket.
	///
	/// Returns `Ok(None)` when no manager is registered for the definition.
	pub fn new(
		registry: &ManagerRegistry,
		definition: &HelperDefinition,
		owner: Option<&Owner>,
		args: impl Into<CapturedArgs>,
	) -> Result<Option<Self>, HelperError> {
		let Some(manager) = registry.get_manager(definition, owner)? else {
			return Ok(None);
		};
		let args = args.into();
		let bucket = manager.create_helper(definition, &args)?;
		tracing::debug!(manager = manager.name(), definition = definition.id().get(), "helper.create");
		Ok(Some(Self {
			definition: definition.clone(),
			manager,
			args,
			bucket,
			last: None,
		}))
	}

	/// Reads the current value.
	///
	/// The read runs in its own tracking frame together with the args tag;
	/// the collected tags are re-consumed into the caller's frame and kept
	/// for [`HelperInvocation::is_stale`].
	pub fn value(&mut self) -> HelperResult {
		let snapshot = current();
		let (result, tags) = track(|| {
			self.args.tag().consume();
			self.manager.get_value(&self.bucket)
		});
		tags.consume();
		match result {
			Ok(value) => {
				self.last = Some(LastRead { tags, snapshot });
				Ok(value)
			}
			Err(err) => {
				self.last = None;
				Err(err)
			}
		}
	}

	/// Returns true if the value must be read again: nothing was read yet, the
	/// last read failed, or a tag it consumed has been dirtied since.
	pub fn is_stale(&self) -> bool {
		self.last.as_ref().is_none_or(|last| !last.tags.validate(last.snapshot))
	}

	/// Tags consumed by the last successful read.
	pub fn tags(&self) -> Option<&CombinedTag> {
		self.last.as_ref().map(|last| &last.tags)
	}

	/// Replaces this call site's arguments. The bucket observes them on its
	/// next read.
	pub fn update_args(&self, args: Arguments) {
		self.args.replace(args);
	}

	pub fn args(&self) -> &CapturedArgs {
		&self.args
	}

	pub fn definition(&self) -> &HelperDefinition {
		&self.definition
	}

	pub fn manager(&self) -> &Arc<ResolvedManager> {
		&self.manager
	}

	pub fn bucket(&self) -> &StateBucket {
		&self.bucket
	}

	/// Returns the bucket's destroyable, or `None` for managers without the
	/// destroyable capability.
	pub fn destroyable(&self) -> Result<Option<Destroyable>, HelperError> {
		match self.manager.shape() {
			ManagerShape::Value => Ok(None),
			ManagerShape::ValueWithDestroyable => self.manager.get_destroyable(&self.bucket).map(Some),
		}
	}

	/// Tears the producer down through its destroyable, if it has one.
	pub fn destroy(&self, run_loop: &RunLoop) -> Result<(), HelperError> {
		if let Some(destroyable) = self.destroyable()? {
			destroyable.destroy(run_loop)?;
		}
		Ok(())
	}

	pub fn debug_name(&self) -> String {
		self.manager.get_debug_name(&self.definition)
	}
}

impl fmt::Debug for HelperInvocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HelperInvocation")
			.field("definition", &self.definition)
			.field("manager", &self.manager)
			.field("stale", &self.is_stale())
			.finish()
	}
}
