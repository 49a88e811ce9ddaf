//! The producer manager protocol.
//!
//! A host resolves a [`HelperDefinition`] to a [`ResolvedManager`] through a
//! frozen [`ManagerRegistry`], asks it for a [`StateBucket`] built from
//! [`CapturedArgs`], and reads values from that bucket. Managers declare what
//! they implement with [`HelperCapabilities`]; the registry checks the
//! declaration against the exposed operations once, at resolution.
//! [`HelperInvocation`] packages the whole sequence for one call site.

mod args;
mod capabilities;
mod definition;
mod error;
mod host;
mod manager;
mod registry;
mod value;

pub use args::{Arguments, CapturedArgs, NamedArgs};
pub use capabilities::{CapabilityError, HelperCapabilities, HelperCapabilityOptions, HelperCapabilitySet, ProtocolVersion, helper_capabilities};
pub use definition::{BaseTypeId, DefinitionId, HelperDefinition, ManagerTarget};
pub use error::{ComputeError, HelperError, HelperResult, RegistryError};
pub use host::HelperInvocation;
pub use manager::{DestroyableManager, HelperManager, ManagerShape, ResolvedManager, StateBucket, ValueManager};
pub use registry::{ManagerFactory, ManagerRegistry, ManagerRegistryBuilder};
pub use value::Value;
