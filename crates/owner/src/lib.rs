//! Owner container for producers.
//!
//! An [`Owner`] maps `type:name` full names to services and to factory
//! classes. Producers reach it in one of two ways: class-less producers get an
//! [`OwnerInjection`] at construction, while producers built from a
//! [`FactoryManager`] are handed the owner through the container's own
//! injection step.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an [`Owner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
	/// Returns the raw identifier.
	pub const fn get(self) -> u64 {
		self.0
	}
}

/// Container registration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OwnerError {
	#[error("invalid full name {0:?}: expected `type:name`")]
	InvalidFullName(String),
	#[error("{0:?} is already registered")]
	AlreadyRegistered(String),
}

type Entry = Arc<dyn Any + Send + Sync>;

struct OwnerInner {
	id: OwnerId,
	name: String,
	services: RwLock<HashMap<String, Entry>>,
	factories: RwLock<HashMap<String, Entry>>,
}

/// Application container handle. Clones share the same container.
#[derive(Clone)]
pub struct Owner {
	inner: Arc<OwnerInner>,
}

impl fmt::Debug for Owner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Owner").field("id", &self.inner.id.0).field("name", &self.inner.name).finish()
	}
}

impl PartialEq for Owner {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for Owner {}

impl Owner {
	/// Creates an empty container.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			inner: Arc::new(OwnerInner {
				id: OwnerId(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed)),
				name: name.into(),
				services: RwLock::new(HashMap::default()),
				factories: RwLock::new(HashMap::default()),
			}),
		}
	}

	/// Returns the container identity.
	pub fn id(&self) -> OwnerId {
		self.inner.id
	}

	/// Returns the container name.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Registers a service instance under `full_name`.
	pub fn register<T>(&self, full_name: &str, service: T) -> Result<(), OwnerError>
	where
		T: Any + Send + Sync,
	{
		insert(&self.inner.services, full_name, Arc::new(service))?;
		tracing::debug!(owner = %self.inner.name, full_name, "owner.register");
		Ok(())
	}

	/// Looks up a service by full name and type.
	///
	/// Returns `None` if nothing is registered or the registered value is not a `T`.
	pub fn lookup<T>(&self, full_name: &str) -> Option<Arc<T>>
	where
		T: Any + Send + Sync,
	{
		let entry = self.inner.services.read().get(full_name).cloned()?;
		entry.downcast::<T>().ok()
	}

	/// Registers a factory class under `full_name`.
	pub fn register_factory<C>(&self, full_name: &str, class: C) -> Result<(), OwnerError>
	where
		C: Any + Send + Sync,
	{
		insert(&self.inner.factories, full_name, Arc::new(class))?;
		tracing::debug!(owner = %self.inner.name, full_name, "owner.register_factory");
		Ok(())
	}

	/// Returns the owner-bound factory registered under `full_name`.
	pub fn factory_for<C>(&self, full_name: &str) -> Option<FactoryManager<C>>
	where
		C: Any + Send + Sync,
	{
		let entry = self.inner.factories.read().get(full_name).cloned()?;
		let class = entry.downcast::<C>().ok()?;
		Some(FactoryManager {
			class,
			owner: self.clone(),
			full_name: full_name.to_owned(),
		})
	}

	/// Returns an injection object pointing at this owner.
	pub fn injection(&self) -> OwnerInjection {
		OwnerInjection::new(Some(self.clone()))
	}
}

fn insert(map: &RwLock<HashMap<String, Entry>>, full_name: &str, entry: Entry) -> Result<(), OwnerError> {
	validate_full_name(full_name)?;
	let mut map = map.write();
	if map.contains_key(full_name) {
		return Err(OwnerError::AlreadyRegistered(full_name.to_owned()));
	}
	map.insert(full_name.to_owned(), entry);
	Ok(())
}

/// Checks the `type:name` shape of a full name.
pub fn validate_full_name(full_name: &str) -> Result<(), OwnerError> {
	match full_name.split_once(':') {
		Some((ty, name)) if !ty.is_empty() && !name.is_empty() && !name.contains(':') => Ok(()),
		_ => Err(OwnerError::InvalidFullName(full_name.to_owned())),
	}
}

/// Context object handed to class-less producers so they can reach their owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerInjection {
	owner: Option<Owner>,
}

impl OwnerInjection {
	/// Creates an injection object for `owner`.
	pub fn new(owner: Option<Owner>) -> Self {
		Self { owner }
	}

	/// Returns the injected owner.
	pub fn owner(&self) -> Option<&Owner> {
		self.owner.as_ref()
	}

	/// Replaces the injected owner.
	pub fn set_owner(&mut self, owner: Owner) {
		self.owner = Some(owner);
	}
}

/// A factory class bound to the owner it was resolved from.
pub struct FactoryManager<C> {
	class: Arc<C>,
	owner: Owner,
	full_name: String,
}

impl<C> Clone for FactoryManager<C> {
	fn clone(&self) -> Self {
		Self {
			class: Arc::clone(&self.class),
			owner: self.owner.clone(),
			full_name: self.full_name.clone(),
		}
	}
}

impl<C> fmt::Debug for FactoryManager<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FactoryManager").field("full_name", &self.full_name).field("owner", &self.owner).finish()
	}
}

impl<C> FactoryManager<C> {
	/// Returns the registered class.
	pub fn class(&self) -> &C {
		&self.class
	}

	/// Returns the owner that resolved this factory.
	pub fn owner(&self) -> &Owner {
		&self.owner
	}

	/// Returns the full name the class was registered under.
	pub fn full_name(&self) -> &str {
		&self.full_name
	}
}
