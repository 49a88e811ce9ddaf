use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use trellis_destroyable::Destroyable;

use crate::args::CapturedArgs;
use crate::capabilities::HelperCapabilities;
use crate::definition::HelperDefinition;
use crate::error::{HelperError, HelperResult, RegistryError};

/// Opaque per-invocation state created by a manager.
///
/// Only the manager that created a bucket can read it back.
pub struct StateBucket(Box<dyn Any + Send + Sync>);

impl StateBucket {
	pub fn new<S>(state: S) -> Self
	where
		S: Any + Send + Sync,
	{
		Self(Box::new(state))
	}

	/// Borrows the state as `S`, or `None` if another manager created it.
	pub fn downcast_ref<S: Any>(&self) -> Option<&S> {
		self.0.downcast_ref::<S>()
	}
}

impl fmt::Debug for StateBucket {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("StateBucket(..)")
	}
}

/// The operations every producer manager implements.
///
/// Optional operations are exposed through [`HelperManager::as_value`] and
/// [`HelperManager::as_destroyable`] and must match the declared
/// [`HelperCapabilities`]; the registry checks this once at resolution.
pub trait HelperManager: Send + Sync + 'static {
	/// Name used in diagnostics.
	fn manager_name(&self) -> &'static str {
		type_name::<Self>()
	}

	/// The capability descriptor built at construction.
	fn capabilities(&self) -> HelperCapabilities;

	/// Creates the state bucket for one invocation of `definition`.
	fn create_helper(&self, definition: &HelperDefinition, args: &CapturedArgs) -> Result<StateBucket, HelperError>;

	/// Returns a diagnostic name for `definition`.
	fn get_debug_name(&self, definition: &HelperDefinition) -> String;

	fn as_value(&self) -> Option<&dyn ValueManager> {
		None
	}

	fn as_destroyable(&self) -> Option<&dyn DestroyableManager> {
		None
	}
}

/// Managers declaring `has_value`.
pub trait ValueManager {
	fn get_value(&self, bucket: &StateBucket) -> HelperResult;
}

/// Managers declaring `has_destroyable`.
pub trait DestroyableManager {
	fn get_destroyable(&self, bucket: &StateBucket) -> Result<Destroyable, HelperError>;
}

/// The operation set a resolved manager was checked to support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerShape {
	Value,
	ValueWithDestroyable,
}

/// A manager whose declared capabilities have been checked against the
/// operations it exposes.
pub struct ResolvedManager {
	manager: Arc<dyn HelperManager>,
	capabilities: HelperCapabilities,
	shape: ManagerShape,
}

impl ResolvedManager {
	/// Checks `manager` and records its shape.
	pub fn check(manager: Arc<dyn HelperManager>) -> Result<Self, RegistryError> {
		let capabilities = manager.capabilities();
		let mismatch = |declared, detail| RegistryError::CapabilityMismatch {
			manager: manager.manager_name().to_owned(),
			declared,
			detail,
		};

		if !capabilities.has_value() {
			return Err(mismatch("no has_value", "only value managers are supported"));
		}
		if manager.as_value().is_none() {
			return Err(mismatch("has_value", "exposes no get_value"));
		}
		let shape = if capabilities.has_destroyable() {
			if manager.as_destroyable().is_none() {
				return Err(mismatch("has_destroyable", "exposes no get_destroyable"));
			}
			ManagerShape::ValueWithDestroyable
		} else {
			ManagerShape::Value
		};

		Ok(Self {
			manager,
			capabilities,
			shape,
		})
	}

	pub fn manager(&self) -> &Arc<dyn HelperManager> {
		&self.manager
	}

	pub fn capabilities(&self) -> HelperCapabilities {
		self.capabilities
	}

	pub fn shape(&self) -> ManagerShape {
		self.shape
	}

	pub fn name(&self) -> &'static str {
		self.manager.manager_name()
	}

	pub fn create_helper(&self, definition: &HelperDefinition, args: &CapturedArgs) -> Result<StateBucket, HelperError> {
		self.manager.create_helper(definition, args)
	}

	pub fn get_value(&self, bucket: &StateBucket) -> HelperResult {
		self.manager
			.as_value()
			.ok_or_else(|| self.violation("get_value"))?
			.get_value(bucket)
	}

	/// Fails with [`HelperError::ProtocolViolation`] unless the manager
	/// declared `has_destroyable`.
	pub fn get_destroyable(&self, bucket: &StateBucket) -> Result<Destroyable, HelperError> {
		if self.shape != ManagerShape::ValueWithDestroyable {
			return Err(self.violation("get_destroyable"));
		}
		self.manager
			.as_destroyable()
			.ok_or_else(|| self.violation("get_destroyable"))?
			.get_destroyable(bucket)
	}

	pub fn get_debug_name(&self, definition: &HelperDefinition) -> String {
		self.manager.get_debug_name(definition)
	}

	fn violation(&self, operation: &'static str) -> HelperError {
		HelperError::ProtocolViolation {
			manager: self.name().to_owned(),
			operation,
		}
	}
}

impl fmt::Debug for ResolvedManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResolvedManager")
			.field("manager", &self.name())
			.field("version", &self.capabilities.version())
			.field("shape", &self.shape)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::args::Arguments;
	use crate::capabilities::{HelperCapabilityOptions, helper_capabilities};
	use crate::value::Value;

	/// Declares whatever it is told to, implements only `get_value`.
	struct Liar {
		capabilities: HelperCapabilities,
	}

	impl Liar {
		fn new(has_destroyable: bool) -> Arc<dyn HelperManager> {
			let options = HelperCapabilityOptions {
				has_value: true,
				has_destroyable,
				..Default::default()
			};
			Arc::new(Self {
				capabilities: helper_capabilities("3.23", options).unwrap(),
			})
		}
	}

	impl HelperManager for Liar {
		fn manager_name(&self) -> &'static str {
			"Liar"
		}

		fn capabilities(&self) -> HelperCapabilities {
			self.capabilities
		}

		fn create_helper(&self, _: &HelperDefinition, _: &CapturedArgs) -> Result<StateBucket, HelperError> {
			Ok(StateBucket::new(42i64))
		}

		fn get_debug_name(&self, _: &HelperDefinition) -> String {
			"liar".into()
		}

		fn as_value(&self) -> Option<&dyn ValueManager> {
			Some(self)
		}
	}

	impl ValueManager for Liar {
		fn get_value(&self, bucket: &StateBucket) -> HelperResult {
			bucket
				.downcast_ref::<i64>()
				.map(|v| Value::Int(*v))
				.ok_or(HelperError::ForeignBucket { manager: "Liar" })
		}
	}

	#[test]
	fn value_shape_is_resolved() {
		let resolved = ResolvedManager::check(Liar::new(false)).unwrap();
		assert_eq!(resolved.shape(), ManagerShape::Value);

		let def = HelperDefinition::new(());
		let bucket = resolved.create_helper(&def, &Arguments::new().into()).unwrap();
		assert_eq!(resolved.get_value(&bucket).unwrap(), Value::Int(42));
	}

	#[test]
	fn undeclared_destroyable_is_a_protocol_violation() {
		let resolved = ResolvedManager::check(Liar::new(false)).unwrap();
		let err = resolved.get_destroyable(&StateBucket::new(1i64)).unwrap_err();
		assert!(matches!(err, HelperError::ProtocolViolation { operation: "get_destroyable", .. }));
	}

	#[test]
	fn declared_but_missing_destroyable_is_a_mismatch() {
		let err = ResolvedManager::check(Liar::new(true)).unwrap_err();
		assert_eq!(
			err,
			RegistryError::CapabilityMismatch {
				manager: "Liar".into(),
				declared: "has_destroyable",
				detail: "exposes no get_destroyable",
			}
		);
	}

	#[test]
	fn buckets_downcast_only_to_their_type() {
		let bucket = StateBucket::new(String::from("state"));
		assert_eq!(bucket.downcast_ref::<String>().map(String::as_str), Some("state"));
		assert!(bucket.downcast_ref::<i64>().is_none());
	}
}
