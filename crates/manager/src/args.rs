use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard};
use trellis_validator::Tag;

use crate::value::Value;

/// Named arguments, in call-site order.
pub type NamedArgs = IndexMap<String, Value>;

/// Positional and named inputs for one producer invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
	pub positional: Vec<Value>,
	pub named: NamedArgs,
}

impl Arguments {
	/// Creates empty arguments.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates arguments from positional values only.
	pub fn positional<I, V>(values: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		Self {
			positional: values.into_iter().map(Into::into).collect(),
			named: NamedArgs::default(),
		}
	}

	/// Adds or replaces a named argument.
	pub fn with_named(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.named.insert(key.into(), value.into());
		self
	}

	/// Returns the positional argument at `index`.
	pub fn get(&self, index: usize) -> Option<&Value> {
		self.positional.get(index)
	}

	/// Returns the named argument `key`.
	pub fn get_named(&self, key: &str) -> Option<&Value> {
		self.named.get(key)
	}
}

/// Shared reference to the argument record of one call site.
///
/// Producers capture this rather than a copy: when the host replaces the
/// record, every holder observes the new arguments, and the args tag is
/// dirtied so cached values keyed on the old record invalidate.
#[derive(Clone)]
pub struct CapturedArgs {
	record: Arc<RwLock<Arguments>>,
	tag: Tag,
}

impl CapturedArgs {
	/// Captures `args` behind a fresh shared record.
	pub fn new(args: Arguments) -> Self {
		Self {
			record: Arc::new(RwLock::new(args)),
			tag: Tag::new(),
		}
	}

	/// Borrows the current record.
	pub fn read(&self) -> RwLockReadGuard<'_, Arguments> {
		self.record.read()
	}

	/// Returns a copy of the current record.
	pub fn snapshot(&self) -> Arguments {
		self.record.read().clone()
	}

	/// Swaps in a new record and dirties the args tag.
	pub fn replace(&self, args: Arguments) {
		*self.record.write() = args;
		self.tag.dirty();
	}

	/// Returns the tag dirtied by [`CapturedArgs::replace`].
	pub fn tag(&self) -> &Tag {
		&self.tag
	}

	/// Returns true if both handles share the same record.
	pub fn ptr_eq(&self, other: &CapturedArgs) -> bool {
		Arc::ptr_eq(&self.record, &other.record)
	}
}

impl fmt::Debug for CapturedArgs {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CapturedArgs").field("args", &*self.record.read()).field("tag", &self.tag).finish()
	}
}

impl From<Arguments> for CapturedArgs {
	fn from(args: Arguments) -> Self {
		Self::new(args)
	}
}
