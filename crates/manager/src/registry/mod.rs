//! Association from producer definitions to the managers responsible for them.
//!
//! Registration happens on a [`ManagerRegistryBuilder`]; [`ManagerRegistryBuilder::freeze`]
//! produces the read-only [`ManagerRegistry`] used for resolution. Resolution
//! tries the definition's exact association first, then its declared base
//! type, and memoizes the checked manager per `(target, owner)`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use trellis_owner::{Owner, OwnerId};

use crate::capabilities::CapabilityError;
use crate::definition::{HelperDefinition, ManagerTarget};
use crate::error::RegistryError;
use crate::manager::{HelperManager, ResolvedManager};


/// Builds a manager for an owner. Runs at most once per `(target, owner)`.
pub type ManagerFactory = Arc<dyn Fn(Option<&Owner>) -> Result<Arc<dyn HelperManager>, CapabilityError> + Send + Sync>;

enum Registration {
	Factory(ManagerFactory),
	/// One manager shared by every owner.
	Instance(Arc<dyn HelperManager>),
}

impl Registration {
	fn cache_owner(&self, owner: Option<&Owner>) -> Option<OwnerId> {
		match self {
			Registration::Factory(_) => owner.map(Owner::id),
			Registration::Instance(_) => None,
		}
	}
}

/// Registration phase of the manager registry.
pub struct ManagerRegistryBuilder {
	label: String,
	entries: FxHashMap<ManagerTarget, Registration>,
}

impl ManagerRegistryBuilder {
	pub fn new(label: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			entries: FxHashMap::default(),
		}
	}

	/// Associates a manager factory with `target`.
	pub fn set_manager<F>(&mut self, target: ManagerTarget, factory: F) -> Result<(), RegistryError>
	where
		F: Fn(Option<&Owner>) -> Result<Arc<dyn HelperManager>, CapabilityError> + Send + Sync + 'static,
	{
		self.insert(target, Registration::Factory(Arc::new(factory)))
	}

	/// Associates one shared manager instance with `target`.
	pub fn set_manager_instance(&mut self, target: ManagerTarget, manager: Arc<dyn HelperManager>) -> Result<(), RegistryError> {
		self.insert(target, Registration::Instance(manager))
	}

	fn insert(&mut self, target: ManagerTarget, registration: Registration) -> Result<(), RegistryError> {
		if self.entries.contains_key(&target) {
			return Err(RegistryError::DuplicateTarget(target));
		}
		tracing::debug!(registry = %self.label, %target, "registry.set_manager");
		self.entries.insert(target, registration);
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Ends registration.
	pub fn freeze(self) -> ManagerRegistry {
		tracing::debug!(registry = %self.label, entries = self.entries.len(), "registry.freeze");
		ManagerRegistry {
			label: self.label,
			entries: self.entries,
			resolved: Mutex::new(FxHashMap::default()),
		}
	}
}

impl fmt::Debug for ManagerRegistryBuilder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ManagerRegistryBuilder")
			.field("label", &self.label)
			.field("entries", &self.entries.len())
			.finish()
	}
}

type CacheKey = (ManagerTarget, Option<OwnerId>);

/// Resolution phase of the manager registry.
pub struct ManagerRegistry {
	label: String,
	entries: FxHashMap<ManagerTarget, Registration>,
	resolved: Mutex<FxHashMap<CacheKey, Arc<ResolvedManager>>>,
}

impl ManagerRegistry {
	pub fn label(&self) -> &str {
		&self.label
	}

	/// Returns the number of registered targets.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Returns true if some target of `definition` has a registration.
	pub fn has_manager(&self, definition: &HelperDefinition) -> bool {
		definition.targets().any(|target| self.entries.contains_key(&target))
	}

	/// Resolves the manager for `definition` under `owner`.
	///
	/// `Ok(None)` means no manager is registered: the definition is not a
	/// producer this registry knows about. Factory and capability failures
	/// propagate.
	pub fn get_manager(&self, definition: &HelperDefinition, owner: Option<&Owner>) -> Result<Option<Arc<ResolvedManager>>, RegistryError> {
		for target in definition.targets() {
			if let Some(resolved) = self.get_manager_for(target, owner)? {
				return Ok(Some(resolved));
			}
		}
		tracing::trace!(registry = %self.label, definition = definition.id().get(), "registry.miss");
		Ok(None)
	}

	/// Resolves the manager registered for exactly `target`.
	pub fn get_manager_for(&self, target: ManagerTarget, owner: Option<&Owner>) -> Result<Option<Arc<ResolvedManager>>, RegistryError> {
		let Some(registration) = self.entries.get(&target) else {
			return Ok(None);
		};
		let key = (target, registration.cache_owner(owner));
		if let Some(hit) = self.resolved.lock().get(&key) {
			tracing::trace!(registry = %self.label, %target, "registry.hit");
			return Ok(Some(Arc::clone(hit)));
		}

		let manager = match registration {
			Registration::Factory(factory) => factory(owner)?,
			Registration::Instance(manager) => Arc::clone(manager),
		};
		let checked = Arc::new(ResolvedManager::check(manager)?);
		let resolved = Arc::clone(self.resolved.lock().entry(key).or_insert(checked));
		tracing::debug!(
			registry = %self.label,
			%target,
			manager = resolved.name(),
			owner = owner.map(Owner::name),
			"registry.construct"
		);
		Ok(Some(resolved))
	}
}

impl fmt::Debug for ManagerRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ManagerRegistry")
			.field("label", &self.label)
			.field("entries", &self.entries.len())
			.field("resolved", &self.resolved.lock().len())
			.finish()
	}
}
