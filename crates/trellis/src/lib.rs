//! Tag-based invalidation with a capability-negotiated producer registry.
//!
//! [`Engine`] wires the pieces together: a [`RunLoop`] for batched
//! invalidation, a frozen [`ManagerRegistry`] with the stateful and stateless
//! producer managers installed, and [`EngineConfig`] loaded from TOML. The
//! component crates are re-exported for hosts that need them directly.

mod config;
mod engine;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuilder, EngineError};
pub use trellis_destroyable::{DestroyState, Destroyable, DestroyableError, DestructorId};
pub use trellis_helper::{
	ClassicHelperDefinition, ClassicHelperManager, Helper, HelperClass, HelperContext, HelperInstance, HelperState, MemoPolicy, RecomputeHandle,
	SimpleClassicHelperManager, SimpleHelper, classic_helper, classic_helper_target, factory_helper, helper, is_classic_helper,
	simple_helper_target,
};
pub use trellis_manager::{
	Arguments, BaseTypeId, CapabilityError, CapturedArgs, ComputeError, DestroyableManager, HelperCapabilities, HelperCapabilityOptions,
	HelperDefinition, HelperError, HelperInvocation, HelperManager, HelperResult, ManagerRegistry, ManagerRegistryBuilder, ManagerShape,
	ManagerTarget, NamedArgs, ProtocolVersion, RegistryError, ResolvedManager, StateBucket, Value, ValueManager, helper_capabilities,
};
pub use trellis_owner::{FactoryManager, Owner, OwnerError, OwnerId, OwnerInjection};
pub use trellis_runloop::{FlushReport, Queue, RunLoop, RunLoopConfig, RunLoopError, TaskKey};
pub use trellis_validator::{CombinedTag, Revision, Tag, consume_tag, create_tag, dirty_tag, track, untrack};
