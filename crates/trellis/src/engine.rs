use std::fmt;
use std::path::Path;
use std::sync::Arc;

use trellis_helper::{SimpleClassicHelperManager, classic_helper_target, install};
use trellis_manager::{
	Arguments, CapabilityError, CapturedArgs, HelperDefinition, HelperError, HelperInvocation, HelperManager, ManagerRegistry, ManagerRegistryBuilder,
	ManagerTarget, RegistryError, ResolvedManager,
};
use trellis_owner::Owner;
use trellis_runloop::{FlushReport, RunLoop, RunLoopError};

use crate::config::{ConfigError, EngineConfig};

/// Failures assembling an [`Engine`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error(transparent)]
	Capability(#[from] CapabilityError),
	#[error(transparent)]
	Registry(#[from] RegistryError),
}

/// Registration phase of an [`Engine`].
///
/// Starts with the stateful and stateless managers installed; more can be
/// added before [`EngineBuilder::build`] freezes the registry.
pub struct EngineBuilder {
	config: EngineConfig,
	run_loop: RunLoop,
	registry: ManagerRegistryBuilder,
	simple: Arc<SimpleClassicHelperManager>,
}

impl EngineBuilder {
	fn new(config: EngineConfig) -> Result<Self, EngineError> {
		config.validate()?;
		let run_loop = RunLoop::with_config(config.run_loop_config());
		let simple = Arc::new(SimpleClassicHelperManager::new()?);
		let mut registry = ManagerRegistryBuilder::new(config.label.clone());
		install(&mut registry, &run_loop, config.memoize, Arc::clone(&simple))?;
		Ok(Self {
			config,
			run_loop,
			registry,
			simple,
		})
	}

	/// The loop every installed manager schedules on.
	pub fn run_loop(&self) -> &RunLoop {
		&self.run_loop
	}

	/// Adds a custom manager factory.
	pub fn set_manager<F>(&mut self, target: ManagerTarget, factory: F) -> Result<&mut Self, EngineError>
	where
		F: Fn(Option<&Owner>) -> Result<Arc<dyn HelperManager>, CapabilityError> + Send + Sync + 'static,
	{
		self.registry.set_manager(target, factory)?;
		Ok(self)
	}

	/// Adds a custom shared manager.
	pub fn set_manager_instance(&mut self, target: ManagerTarget, manager: Arc<dyn HelperManager>) -> Result<&mut Self, EngineError> {
		self.registry.set_manager_instance(target, manager)?;
		Ok(self)
	}

	/// Freezes the registry.
	pub fn build(self) -> Engine {
		tracing::info!(label = %self.config.label, memoize = self.config.memoize.as_str(), "engine.build");
		Engine {
			registry: Arc::new(self.registry.freeze()),
			config: self.config,
			run_loop: self.run_loop,
			simple: self.simple,
		}
	}
}

/// A frozen registry and the run loop its managers share.
pub struct Engine {
	config: EngineConfig,
	run_loop: RunLoop,
	registry: Arc<ManagerRegistry>,
	simple: Arc<SimpleClassicHelperManager>,
}

impl Engine {
	pub fn builder(config: EngineConfig) -> Result<EngineBuilder, EngineError> {
		EngineBuilder::new(config)
	}

	/// Builds an engine with only the installed managers.
	pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
		Ok(Self::builder(config)?.build())
	}

	/// Builds an engine from a TOML config file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
		Self::new(EngineConfig::load(path)?)
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn registry(&self) -> &Arc<ManagerRegistry> {
		&self.registry
	}

	pub fn run_loop(&self) -> &RunLoop {
		&self.run_loop
	}

	/// Resolves `definition` and creates its state bucket.
	///
	/// Returns `Ok(None)` when no manager is registered for it.
	pub fn invoke(&self, definition: &HelperDefinition, owner: Option<&Owner>, args: Arguments) -> Result<Option<HelperInvocation>, HelperError> {
		HelperInvocation::new(&self.registry, definition, owner, CapturedArgs::new(args))
	}

	/// Runs `f` in a batch and flushes when it closes.
	pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R, RunLoopError> {
		self.run_loop.run(f)
	}

	pub fn flush(&self) -> Result<FlushReport, RunLoopError> {
		self.run_loop.flush()
	}

	/// The stateful manager serving `owner`, built on first use.
	pub fn classic_helper_manager(&self, owner: Option<&Owner>) -> Result<Option<Arc<ResolvedManager>>, RegistryError> {
		self.registry.get_manager_for(classic_helper_target(), owner)
	}

	/// The stateless manager shared by every owner.
	pub fn simple_helper_manager(&self) -> &Arc<SimpleClassicHelperManager> {
		&self.simple
	}
}

impl fmt::Debug for Engine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Engine")
			.field("config", &self.config)
			.field("registry", &self.registry)
			.finish()
	}
}
