//! Error types for runtime construction and configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::address::Address;

/// Errors raised while creating objects, groups or the runtime itself.
///
/// Delivery problems are never errors: a message that cannot be delivered is
/// logged and dropped.
#[derive(Debug, Error)]
pub enum RuntimeError {
	/// The OS refused to create a thread.
	#[error("failed to spawn thread {name}: {error}")]
	Spawn {
		/// Name the thread would have carried.
		name: String,
		/// The underlying I/O error.
		#[source]
		error: std::io::Error,
	},

	/// The address given to `spawn_in` is not a live thread-dispatch group.
	#[error("{0} is not a thread-dispatch group")]
	UnknownGroup(Address),

	/// The group exists but its mailbox no longer accepts members.
	#[error("group {0} is not accepting members")]
	GroupUnavailable(Address),

	/// The runtime configuration was rejected.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Errors that can occur when loading the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or an unknown key.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A value parsed but is out of range.
	#[error("invalid value for '{field}': {reason}")]
	Invalid {
		/// Dotted key of the offending value.
		field: &'static str,
		reason: &'static str,
	},
}
