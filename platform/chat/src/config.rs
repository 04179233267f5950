use std::time::Duration;

use common::config::{DatabaseConfig, LoggingConfig, NatsConfig};

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
/// The chat core of the planet platform
pub struct AppConfig {
	/// Name of this instance
	pub name: String,

	/// The logging config
	pub logging: LoggingConfig,

	/// Database config
	pub database: DatabaseConfig,

	/// Nats config
	pub nats: NatsConfig,

	/// Message staging config
	pub staging: StagingConfig,

	/// Permission resolution config
	pub permissions: PermissionsConfig,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			name: "platform-chat".to_string(),
			logging: LoggingConfig::default(),
			database: DatabaseConfig::default(),
			nats: NatsConfig::default(),
			staging: StagingConfig::default(),
			permissions: PermissionsConfig::default(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct StagingConfig {
	/// How often staged messages are flushed
	#[serde(with = "humantime_serde")]
	pub flush_interval: Duration,

	/// Flush early once this many messages are staged across all channels
	pub flush_threshold: usize,

	/// Posting to a channel is rejected once it holds this many staged
	/// messages
	pub max_staged_per_channel: usize,

	/// Delay before the first retry of a failed flush, doubled on every
	/// further failure
	#[serde(with = "humantime_serde")]
	pub retry_backoff: Duration,

	/// Upper bound of the retry delay
	#[serde(with = "humantime_serde")]
	pub max_retry_backoff: Duration,

	/// Consecutive flush failures after which errors are logged instead of
	/// warnings
	pub alert_after_failures: u32,

	/// How long the final flush may take on shutdown
	#[serde(with = "humantime_serde")]
	pub shutdown_timeout: Duration,
}

impl Default for StagingConfig {
	fn default() -> Self {
		Self {
			flush_interval: Duration::from_secs(5),
			flush_threshold: 1000,
			max_staged_per_channel: 10_000,
			retry_backoff: Duration::from_secs(1),
			max_retry_backoff: Duration::from_secs(60),
			alert_after_failures: 5,
			shutdown_timeout: Duration::from_secs(10),
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
	/// How long resolved permissions are cached, 0s disables the cache
	#[serde(with = "humantime_serde")]
	pub cache_ttl: Duration,
}

impl Default for PermissionsConfig {
	fn default() -> Self {
		Self {
			cache_ttl: Duration::from_secs(30),
		}
	}
}
