use std::error::Error as StdError;
use std::fmt;

use trellis_destroyable::DestroyableError;
use trellis_runloop::RunLoopError;

use crate::capabilities::CapabilityError;
use crate::definition::ManagerTarget;
use crate::value::Value;

/// Result of reading a producer's value.
pub type HelperResult<T = Value> = Result<T, HelperError>;

/// An error raised by a producer's own computation.
///
/// The original error is kept as the source, untouched.
#[derive(Debug)]
pub struct ComputeError {
	source: Box<dyn StdError + Send + Sync + 'static>,
}

impl ComputeError {
	/// Wraps a producer error.
	pub fn new<E>(error: E) -> Self
	where
		E: Into<Box<dyn StdError + Send + Sync + 'static>>,
	{
		Self { source: error.into() }
	}

	/// Creates an error from a message.
	pub fn msg(message: impl fmt::Display) -> Self {
		Self::new(message.to_string())
	}

	/// Borrows the producer's error.
	pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
		&*self.source
	}

	/// Returns the producer's error as `E`, if it is one.
	pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
		self.source.downcast_ref::<E>()
	}

	/// Unwraps into the producer's error.
	pub fn into_inner(self) -> Box<dyn StdError + Send + Sync + 'static> {
		self.source
	}
}

impl fmt::Display for ComputeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.source, f)
	}
}

impl StdError for ComputeError {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		Some(&*self.source)
	}
}

/// Failures surfaced through the manager protocol.
#[derive(Debug, thiserror::Error)]
pub enum HelperError {
	/// The producer's computation failed.
	#[error("helper compute failed: {0}")]
	Compute(#[from] ComputeError),
	/// A manager was handed a definition it does not manage.
	#[error("{manager} cannot create a helper from this definition")]
	ForeignDefinition { manager: &'static str },
	/// A manager was handed a bucket some other manager created.
	#[error("{manager} was given a state bucket it did not create")]
	ForeignBucket { manager: &'static str },
	/// The host called an operation the manager never declared.
	#[error("{manager} does not declare the capability for {operation}")]
	ProtocolViolation { manager: String, operation: &'static str },
	/// The producer instance has been destroyed.
	#[error("helper {name} was used after it was destroyed")]
	Destroyed { name: String },
	#[error(transparent)]
	Destroyable(#[from] DestroyableError),
	#[error(transparent)]
	Registry(#[from] RegistryError),
	#[error(transparent)]
	RunLoop(#[from] RunLoopError),
}

/// Registration and resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
	#[error("a helper manager is already registered for {0}")]
	DuplicateTarget(ManagerTarget),
	#[error("helper manager construction failed: {0}")]
	Capability(#[from] CapabilityError),
	#[error("{manager} declares {declared} but {detail}")]
	CapabilityMismatch {
		manager: String,
		declared: &'static str,
		detail: &'static str,
	},
}
