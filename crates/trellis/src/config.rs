use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trellis_helper::MemoPolicy;
use trellis_runloop::{DEFAULT_MAX_FLUSH_TASKS, RunLoopConfig};

/// Engine settings, usually read from TOML.
///
/// ```toml
/// label = "app"
/// memoize = "per_revision"
/// max_flush_tasks = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
	/// Name used for the registry in diagnostics.
	pub label: String,
	/// Caching of stateful producer values.
	pub memoize: MemoPolicy,
	/// Tasks one flush may run before it is treated as runaway.
	pub max_flush_tasks: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			label: "trellis".to_owned(),
			memoize: MemoPolicy::default(),
			max_flush_tasks: DEFAULT_MAX_FLUSH_TASKS,
		}
	}
}

/// Errors reading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid {field}: {reason}")]
	Invalid { field: &'static str, reason: String },
}

impl EngineConfig {
	/// Parses and validates a TOML document. Missing keys take their defaults.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads and parses the TOML file at `path`.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::from_toml_str(&input)?;
		tracing::debug!(path = %path.display(), label = %config.label, memoize = config.memoize.as_str(), "config.load");
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_flush_tasks == 0 {
			return Err(ConfigError::Invalid {
				field: "max_flush_tasks",
				reason: "must be greater than zero".to_owned(),
			});
		}
		if self.label.trim().is_empty() {
			return Err(ConfigError::Invalid {
				field: "label",
				reason: "must not be empty".to_owned(),
			});
		}
		Ok(())
	}

	pub fn run_loop_config(&self) -> RunLoopConfig {
		RunLoopConfig {
			max_flush_tasks: self.max_flush_tasks,
		}
	}
}
