//! Producers built on the manager protocol.
//!
//! Stateful producers implement [`Helper`] and are served by one
//! [`ClassicHelperManager`] per owner. Stateless producers wrap a function
//! with [`helper`] and share a single [`SimpleClassicHelperManager`].
//! [`install`] registers both against their base-type targets.

mod classic;
mod memo;
mod simple;

use std::sync::Arc;

use trellis_manager::{ManagerRegistryBuilder, RegistryError};
use trellis_runloop::RunLoop;

pub use classic::{
	ClassicHelperDefinition, ClassicHelperKind, ClassicHelperManager, Helper, HelperClass, HelperContext, HelperInstance, HelperState,
	RecomputeHandle, classic_helper, classic_helper_target, factory_helper, is_classic_helper,
};
pub use memo::MemoPolicy;
pub use simple::{SimpleClassicHelperManager, SimpleHelper, SimpleHelperKind, SimpleHelperRecord, helper, simple_helper_target};

/// Registers the stateful and stateless managers on `builder`.
///
/// Stateful managers are built per owner and schedule recomputes on
/// `run_loop`; the stateless manager is shared.
pub fn install(
	builder: &mut ManagerRegistryBuilder,
	run_loop: &RunLoop,
	memo: MemoPolicy,
	simple: Arc<SimpleClassicHelperManager>,
) -> Result<(), RegistryError> {
	builder.set_manager(classic_helper_target(), ClassicHelperManager::factory(run_loop.clone(), memo))?;
	builder.set_manager_instance(simple_helper_target(), simple)?;
	Ok(())
}
