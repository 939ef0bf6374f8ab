//! Runtime configuration.
//!
//! ```toml
//! thread-prefix = "cadence"
//!
//! [mailbox]
//! capacity = 8192
//! blocking-capacity = 32768
//! policy = "drop-newest"
//!
//! [timer]
//! tick-ms = 250
//! minimum-period-ms = 200
//!
//! [replay]
//! maximum-replays = 8
//! ```
//!
//! Every key is optional.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mailbox::{DEFAULT_BLOCKING_CAPACITY, DEFAULT_CAPACITY, MailboxPolicy, MailboxSpec};
use crate::replay::MAXIMUM_REPLAYS;
use crate::timer::{MINIMUM_PERIOD, TICK_INTERVAL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RuntimeConfig {
	pub mailbox: MailboxConfig,
	pub timer: TimerConfig,
	pub replay: ReplayConfig,
	/// Prefix for every thread the runtime names.
	pub thread_prefix: String,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			mailbox: MailboxConfig::default(),
			timer: TimerConfig::default(),
			replay: ReplayConfig::default(),
			thread_prefix: "cadence".to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MailboxConfig {
	/// Bound for drop-newest mailboxes.
	pub capacity: usize,
	/// Bound for backpressure mailboxes.
	pub blocking_capacity: usize,
	/// Policy used by `spawn` and `spawn_group`.
	pub policy: MailboxPolicy,
}

impl Default for MailboxConfig {
	fn default() -> Self {
		Self {
			capacity: DEFAULT_CAPACITY,
			blocking_capacity: DEFAULT_BLOCKING_CAPACITY,
			policy: MailboxPolicy::default(),
		}
	}
}

impl MailboxConfig {
	/// Mailbox shape for the configured default policy.
	pub fn spec(&self) -> MailboxSpec {
		self.spec_for(self.policy)
	}

	pub fn spec_for(&self, policy: MailboxPolicy) -> MailboxSpec {
		let capacity = match policy {
			MailboxPolicy::Backpressure => self.blocking_capacity,
			MailboxPolicy::DropNewest => self.capacity,
		};
		MailboxSpec { capacity, policy }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TimerConfig {
	pub tick_ms: u64,
	pub minimum_period_ms: u64,
}

impl Default for TimerConfig {
	fn default() -> Self {
		Self {
			tick_ms: TICK_INTERVAL.as_millis() as u64,
			minimum_period_ms: MINIMUM_PERIOD.as_millis() as u64,
		}
	}
}

impl TimerConfig {
	pub fn tick_interval(&self) -> Duration {
		Duration::from_millis(self.tick_ms)
	}

	pub fn minimum_period(&self) -> Duration {
		Duration::from_millis(self.minimum_period_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReplayConfig {
	pub maximum_replays: u32,
}

impl Default for ReplayConfig {
	fn default() -> Self {
		Self {
			maximum_replays: MAXIMUM_REPLAYS,
		}
	}
}

impl RuntimeConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml(&source)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.mailbox.capacity == 0 {
			return Err(ConfigError::Invalid {
				field: "mailbox.capacity",
				reason: "must be at least 1",
			});
		}
		if self.mailbox.blocking_capacity == 0 {
			return Err(ConfigError::Invalid {
				field: "mailbox.blocking-capacity",
				reason: "must be at least 1",
			});
		}
		if self.timer.tick_ms == 0 {
			return Err(ConfigError::Invalid {
				field: "timer.tick-ms",
				reason: "must be at least 1",
			});
		}
		if self.thread_prefix.is_empty() {
			return Err(ConfigError::Invalid {
				field: "thread-prefix",
				reason: "must not be empty",
			});
		}
		Ok(())
	}
}
