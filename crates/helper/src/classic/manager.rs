use std::sync::Arc;

use parking_lot::Mutex;
use trellis_destroyable::Destroyable;
use trellis_manager::{
	CapabilityError, CapturedArgs, DestroyableManager, HelperCapabilities, HelperCapabilityOptions, HelperDefinition, HelperError, HelperManager,
	HelperResult, StateBucket, Value, ValueManager, helper_capabilities,
};
use trellis_owner::{Owner, OwnerInjection};
use trellis_runloop::RunLoop;
use trellis_validator::{CombinedTag, Revision, current, track};

use super::{ClassicHelperDefinition, HelperInstance, HelperState};
use crate::memo::MemoPolicy;

const MANAGER: &str = "ClassicHelperManager";

struct Memo {
	value: Value,
	tags: CombinedTag,
	snapshot: Revision,
}

struct ClassicBucket {
	instance: Arc<HelperInstance>,
	args: CapturedArgs,
	memo: Mutex<Option<Memo>>,
}

/// Manager for stateful producers. One is built per owner.
pub struct ClassicHelperManager {
	capabilities: HelperCapabilities,
	injection: OwnerInjection,
	run_loop: RunLoop,
	memo: MemoPolicy,
}

impl ClassicHelperManager {
	pub fn new(owner: Option<&Owner>, run_loop: RunLoop, memo: MemoPolicy) -> Result<Self, CapabilityError> {
		let capabilities = helper_capabilities(
			"3.23",
			HelperCapabilityOptions {
				has_value: true,
				has_destroyable: true,
				..Default::default()
			},
		)?;
		Ok(Self {
			capabilities,
			injection: OwnerInjection::new(owner.cloned()),
			run_loop,
			memo,
		})
	}

	/// Returns a registry factory building one manager per owner.
	pub fn factory(run_loop: RunLoop, memo: MemoPolicy) -> impl Fn(Option<&Owner>) -> Result<Arc<dyn HelperManager>, CapabilityError> + Send + Sync + 'static {
		move |owner| {
			let manager: Arc<dyn HelperManager> = Arc::new(Self::new(owner, run_loop.clone(), memo)?);
			Ok(manager)
		}
	}

	pub fn owner(&self) -> Option<&Owner> {
		self.injection.owner()
	}

	pub fn memo_policy(&self) -> MemoPolicy {
		self.memo
	}

	/// Returns the instance held by a bucket this manager type created.
	pub fn instance(bucket: &StateBucket) -> Option<&Arc<HelperInstance>> {
		bucket.downcast_ref::<ClassicBucket>().map(|bucket| &bucket.instance)
	}

	fn bucket<'a>(&self, bucket: &'a StateBucket) -> Result<&'a ClassicBucket, HelperError> {
		bucket.downcast_ref::<ClassicBucket>().ok_or(HelperError::ForeignBucket { manager: MANAGER })
	}

	fn cached(&self, bucket: &ClassicBucket) -> Option<Value> {
		if self.memo != MemoPolicy::PerRevision || bucket.instance.state() != HelperState::Created {
			return None;
		}
		let memo = bucket.memo.lock();
		let memo = memo.as_ref()?;
		if !memo.tags.validate(memo.snapshot) {
			return None;
		}
		memo.tags.consume();
		Some(memo.value.clone())
	}
}

impl HelperManager for ClassicHelperManager {
	fn manager_name(&self) -> &'static str {
		MANAGER
	}

	fn capabilities(&self) -> HelperCapabilities {
		self.capabilities
	}

	fn create_helper(&self, definition: &HelperDefinition, args: &CapturedArgs) -> Result<StateBucket, HelperError> {
		let payload = definition
			.payload::<ClassicHelperDefinition>()
			.ok_or(HelperError::ForeignDefinition { manager: MANAGER })?;
		let instance = HelperInstance::create(payload, &self.injection, &self.run_loop)?;
		Ok(StateBucket::new(ClassicBucket {
			instance: Arc::new(instance),
			args: args.clone(),
			memo: Mutex::new(None),
		}))
	}

	fn get_debug_name(&self, definition: &HelperDefinition) -> String {
		match definition.payload::<ClassicHelperDefinition>() {
			Some(payload) => payload.class().name().to_owned(),
			None => format!("(unknown helper #{})", definition.id().get()),
		}
	}

	fn as_value(&self) -> Option<&dyn ValueManager> {
		Some(self)
	}

	fn as_destroyable(&self) -> Option<&dyn DestroyableManager> {
		Some(self)
	}
}

impl ValueManager for ClassicHelperManager {
	/// Computes first, then consumes the recompute tag, so a recompute
	/// requested while computing is not satisfied by this read.
	fn get_value(&self, bucket: &StateBucket) -> HelperResult {
		let bucket = self.bucket(bucket)?;
		if let Some(value) = self.cached(bucket) {
			tracing::trace!(helper = bucket.instance.name(), "helper.memo_hit");
			return Ok(value);
		}

		let snapshot = current();
		let (result, tags) = track(|| {
			bucket.args.tag().consume();
			let args = bucket.args.snapshot();
			let value = bucket.instance.compute(&args)?;
			bucket.instance.recompute_tag().consume();
			Ok::<_, HelperError>(value)
		});
		tags.consume();
		let value = result?;

		if self.memo == MemoPolicy::PerRevision {
			*bucket.memo.lock() = Some(Memo {
				value: value.clone(),
				tags,
				snapshot,
			});
		}
		Ok(value)
	}
}

impl DestroyableManager for ClassicHelperManager {
	fn get_destroyable(&self, bucket: &StateBucket) -> Result<Destroyable, HelperError> {
		Ok(self.bucket(bucket)?.instance.destroyable().clone())
	}
}
