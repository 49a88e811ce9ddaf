use std::fmt;
use std::str::FromStr;

/// Manager protocol generations understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
	/// The `3.23` helper manager protocol.
	V3_23,
}

impl ProtocolVersion {
	/// Every supported version.
	pub const SUPPORTED: &'static [ProtocolVersion] = &[ProtocolVersion::V3_23];

	/// Returns the version string.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::V3_23 => "3.23",
		}
	}
}

impl fmt::Display for ProtocolVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ProtocolVersion {
	type Err = CapabilityError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::SUPPORTED
			.iter()
			.copied()
			.find(|v| v.as_str() == s)
			.ok_or_else(|| CapabilityError::UnsupportedVersion(s.to_owned()))
	}
}

bitflags::bitflags! {
	/// Optional manager operations.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct HelperCapabilitySet: u8 {
		/// The manager produces values through `get_value`.
		const HAS_VALUE = 1 << 0;
		/// The manager exposes per-bucket destroyables through `get_destroyable`.
		const HAS_DESTROYABLE = 1 << 1;
		/// The manager runs scheduled side effects instead of producing values.
		const HAS_SCHEDULED_EFFECT = 1 << 2;
	}
}

/// Requested capabilities, before validation.
///
/// Fields not named here are not part of any supported protocol; construct
/// with `..Default::default()` so new fields stay source compatible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HelperCapabilityOptions {
	pub has_value: bool,
	pub has_destroyable: bool,
	pub has_scheduled_effect: bool,
}

/// Configuration errors raised while building a capability descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
	#[error("unsupported helper manager capabilities version {0:?} (supported: 3.23)")]
	UnsupportedVersion(String),
	#[error("a helper manager must declare exactly one of has_value and has_scheduled_effect")]
	ValueXorScheduledEffect,
	#[error("the has_scheduled_effect capability is not implemented for helper managers")]
	ScheduledEffectUnimplemented,
}

/// Immutable, versioned record of what a manager implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HelperCapabilities {
	version: ProtocolVersion,
	set: HelperCapabilitySet,
}

impl HelperCapabilities {
	/// Returns the protocol generation.
	pub fn version(&self) -> ProtocolVersion {
		self.version
	}

	/// Returns the declared operation set.
	pub fn set(&self) -> HelperCapabilitySet {
		self.set
	}

	/// Returns true if `get_value` may be called.
	pub fn has_value(&self) -> bool {
		self.set.contains(HelperCapabilitySet::HAS_VALUE)
	}

	/// Returns true if `get_destroyable` may be called.
	pub fn has_destroyable(&self) -> bool {
		self.set.contains(HelperCapabilitySet::HAS_DESTROYABLE)
	}

	/// Returns true if the manager runs scheduled effects.
	pub fn has_scheduled_effect(&self) -> bool {
		self.set.contains(HelperCapabilitySet::HAS_SCHEDULED_EFFECT)
	}
}

/// Builds a capability descriptor, failing fast on an unknown version or an
/// unsupported combination.
pub fn helper_capabilities(version: &str, options: HelperCapabilityOptions) -> Result<HelperCapabilities, CapabilityError> {
	let version = version.parse::<ProtocolVersion>()?;

	if options.has_value == options.has_scheduled_effect {
		return Err(CapabilityError::ValueXorScheduledEffect);
	}
	if options.has_scheduled_effect {
		return Err(CapabilityError::ScheduledEffectUnimplemented);
	}

	let mut set = HelperCapabilitySet::empty();
	set.set(HelperCapabilitySet::HAS_VALUE, options.has_value);
	set.set(HelperCapabilitySet::HAS_DESTROYABLE, options.has_destroyable);
	Ok(HelperCapabilities { version, set })
}
