use serde::{Deserialize, Serialize};

/// Whether the stateful manager caches a bucket's last value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoPolicy {
	/// Reuse the last value while every tag it consumed still validates
	/// against the revision taken before computing it.
	#[default]
	PerRevision,
	/// Run `compute` on every read.
	Never,
}

impl MemoPolicy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::PerRevision => "per_revision",
			Self::Never => "never",
		}
	}
}
