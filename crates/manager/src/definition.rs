use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DEFINITION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one producer definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefinitionId(u64);

impl DefinitionId {
	/// Returns the raw identifier.
	pub const fn get(self) -> u64 {
		self.0
	}
}

/// Identity of a base producer type shared by many definitions.
#[derive(Clone, Copy)]
pub struct BaseTypeId {
	id: TypeId,
	name: &'static str,
}

impl BaseTypeId {
	/// Returns the base type id for marker type `B`.
	pub fn of<B: ?Sized + 'static>() -> Self {
		Self {
			id: TypeId::of::<B>(),
			name: type_name::<B>(),
		}
	}

	/// Returns the marker type's name.
	pub fn name(&self) -> &'static str {
		self.name
	}
}

impl PartialEq for BaseTypeId {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for BaseTypeId {}

impl std::hash::Hash for BaseTypeId {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Debug for BaseTypeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BaseTypeId({})", self.name)
	}
}

/// Where a manager association is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerTarget {
	/// One definition, one manager.
	Exact(DefinitionId),
	/// One manager for every definition declaring this base type.
	Base(BaseTypeId),
}

impl fmt::Display for ManagerTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ManagerTarget::Exact(id) => write!(f, "definition #{}", id.0),
			ManagerTarget::Base(base) => write!(f, "base {}", base.name),
		}
	}
}

struct DefinitionInner {
	id: DefinitionId,
	base: Option<BaseTypeId>,
	payload: Box<dyn Any + Send + Sync>,
}

/// A producer definition: identity, optional base type, and a payload only
/// the responsible manager knows how to read.
///
/// Clones share identity.
#[derive(Clone)]
pub struct HelperDefinition {
	inner: Arc<DefinitionInner>,
}

impl HelperDefinition {
	/// Creates a definition with no base type; only an exact association can
	/// resolve it.
	pub fn new<P>(payload: P) -> Self
	where
		P: Any + Send + Sync,
	{
		Self::build(None, payload)
	}

	/// Creates a definition that resolves through base type `B` when it has no
	/// exact association.
	pub fn with_base<B, P>(payload: P) -> Self
	where
		B: ?Sized + 'static,
		P: Any + Send + Sync,
	{
		Self::build(Some(BaseTypeId::of::<B>()), payload)
	}

	fn build<P>(base: Option<BaseTypeId>, payload: P) -> Self
	where
		P: Any + Send + Sync,
	{
		Self {
			inner: Arc::new(DefinitionInner {
				id: DefinitionId(NEXT_DEFINITION_ID.fetch_add(1, Ordering::Relaxed)),
				base,
				payload: Box::new(payload),
			}),
		}
	}

	/// Returns this definition's identity.
	pub fn id(&self) -> DefinitionId {
		self.inner.id
	}

	/// Returns the declared base type.
	pub fn base(&self) -> Option<BaseTypeId> {
		self.inner.base
	}

	/// Returns the targets to try, exact association first.
	pub fn targets(&self) -> impl Iterator<Item = ManagerTarget> + '_ {
		std::iter::once(ManagerTarget::Exact(self.inner.id)).chain(self.inner.base.map(ManagerTarget::Base))
	}

	/// Borrows the payload as `P`.
	pub fn payload<P: Any>(&self) -> Option<&P> {
		self.inner.payload.downcast_ref::<P>()
	}

	/// Returns true if the payload is a `P`.
	pub fn is<P: Any>(&self) -> bool {
		self.inner.payload.is::<P>()
	}
}

impl PartialEq for HelperDefinition {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for HelperDefinition {}

impl fmt::Debug for HelperDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HelperDefinition").field("id", &self.inner.id.0).field("base", &self.inner.base).finish()
	}
}
