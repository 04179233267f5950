use std::time::Duration;

use crate::config::{AppConfig, StagingConfig};

#[test]
fn test_defaults() {
	let config = AppConfig::default();

	assert_eq!(config.name, "platform-chat");
	assert_eq!(config.staging.flush_interval, Duration::from_secs(5));
	assert_eq!(config.staging.flush_threshold, 1000);
	assert_eq!(config.staging.max_staged_per_channel, 10_000);
	assert_eq!(config.permissions.cache_ttl, Duration::from_secs(30));
}

#[test]
fn test_partial_config_keeps_defaults() {
	let config: AppConfig = serde_json::from_str(
		r#"{
			"name": "chat-1",
			"staging": { "flush_interval": "250ms", "max_retry_backoff": "2m" },
			"permissions": { "cache_ttl": "0s" }
		}"#,
	)
	.unwrap();

	assert_eq!(config.name, "chat-1");
	assert_eq!(config.staging.flush_interval, Duration::from_millis(250));
	assert_eq!(config.staging.max_retry_backoff, Duration::from_secs(120));
	assert_eq!(config.staging.retry_backoff, StagingConfig::default().retry_backoff);
	assert_eq!(config.permissions.cache_ttl, Duration::ZERO);
	assert_eq!(config.logging, AppConfig::default().logging);
}
