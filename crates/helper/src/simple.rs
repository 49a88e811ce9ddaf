//! Stateless producers wrapping a plain function.

use std::fmt;
use std::sync::Arc;

use trellis_manager::{
	BaseTypeId, CapabilityError, CapturedArgs, ComputeError, HelperCapabilities, HelperCapabilityOptions, HelperDefinition, HelperError,
	HelperManager, HelperResult, ManagerTarget, NamedArgs, StateBucket, Value, ValueManager, helper_capabilities,
};

const MANAGER: &str = "SimpleClassicHelperManager";

type HelperFn = dyn Fn(&[Value], &NamedArgs) -> Result<Value, ComputeError> + Send + Sync;

/// Marker base type shared by every stateless producer definition.
pub enum SimpleHelperKind {}

/// A named wrapper around a producer function.
#[derive(Clone)]
pub struct SimpleHelper {
	name: Arc<str>,
	compute: Arc<HelperFn>,
}

impl SimpleHelper {
	pub fn new<F>(name: impl Into<Arc<str>>, compute: F) -> Self
	where
		F: Fn(&[Value], &NamedArgs) -> Result<Value, ComputeError> + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			compute: Arc::new(compute),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns a fresh record for one bucket. Records never share anything
	/// but the function itself.
	pub fn create(&self) -> SimpleHelperRecord {
		SimpleHelperRecord {
			compute: Arc::clone(&self.compute),
		}
	}
}

impl fmt::Debug for SimpleHelper {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("SimpleHelper").field(&self.name).finish()
	}
}

/// The per-bucket record built by [`SimpleHelper::create`].
pub struct SimpleHelperRecord {
	compute: Arc<HelperFn>,
}

impl SimpleHelperRecord {
	/// Binds the record to a call site's arguments. The returned call copies
	/// the record at call time, so replaced arguments are observed and the
	/// producer may replace them while it runs.
	fn bind(self, args: CapturedArgs) -> BoundCall {
		Box::new(move || {
			let args = args.snapshot();
			Ok((self.compute)(&args.positional, &args.named)?)
		})
	}
}

type BoundCall = Box<dyn Fn() -> HelperResult + Send + Sync>;

struct SimpleBucket {
	call: BoundCall,
}

/// Defines a stateless producer.
pub fn helper<F>(name: impl Into<Arc<str>>, compute: F) -> HelperDefinition
where
	F: Fn(&[Value], &NamedArgs) -> Result<Value, ComputeError> + Send + Sync + 'static,
{
	HelperDefinition::with_base::<SimpleHelperKind, _>(SimpleHelper::new(name, compute))
}

/// The registry target every stateless producer definition resolves through.
pub fn simple_helper_target() -> ManagerTarget {
	ManagerTarget::Base(BaseTypeId::of::<SimpleHelperKind>())
}

/// Manager for stateless producers. A single instance serves every owner.
pub struct SimpleClassicHelperManager {
	capabilities: HelperCapabilities,
}

impl SimpleClassicHelperManager {
	pub fn new() -> Result<Self, CapabilityError> {
		let capabilities = helper_capabilities(
			"3.23",
			HelperCapabilityOptions {
				has_value: true,
				..Default::default()
			},
		)?;
		Ok(Self { capabilities })
	}
}

impl HelperManager for SimpleClassicHelperManager {
	fn manager_name(&self) -> &'static str {
		MANAGER
	}

	fn capabilities(&self) -> HelperCapabilities {
		self.capabilities
	}

	fn create_helper(&self, definition: &HelperDefinition, args: &CapturedArgs) -> Result<StateBucket, HelperError> {
		let wrapper = definition
			.payload::<SimpleHelper>()
			.ok_or(HelperError::ForeignDefinition { manager: MANAGER })?;
		tracing::trace!(helper = wrapper.name(), "helper.bind");
		Ok(StateBucket::new(SimpleBucket {
			call: wrapper.create().bind(args.clone()),
		}))
	}

	fn get_debug_name(&self, definition: &HelperDefinition) -> String {
		match definition.payload::<SimpleHelper>() {
			Some(wrapper) => wrapper.name().to_owned(),
			None => format!("(unknown helper #{})", definition.id().get()),
		}
	}

	fn as_value(&self) -> Option<&dyn ValueManager> {
		Some(self)
	}
}

impl ValueManager for SimpleClassicHelperManager {
	/// Invokes the bound call. Consumes no tags of its own.
	fn get_value(&self, bucket: &StateBucket) -> HelperResult {
		let bucket = bucket
			.downcast_ref::<SimpleBucket>()
			.ok_or(HelperError::ForeignBucket { manager: MANAGER })?;
		(bucket.call)()
	}
}
