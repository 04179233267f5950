use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::logging;

/// Prefix for environment overrides, `PLANET_STAGING__FLUSH_INTERVAL=10s`
/// sets `staging.flush_interval`.
pub const ENV_PREFIX: &str = "PLANET";

const CONFIG_ARG_ID: &str = "config";

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
	/// The log level to use, this is a tracing env filter
	pub level: String,

	/// What logging mode we should use
	pub mode: logging::Mode,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			mode: logging::Mode::Default,
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
	/// The database URL to use
	pub uri: String,

	/// Maximum number of pooled connections
	pub max_connections: u32,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			uri: "postgres://root@localhost:5432/planet_dev".to_string(),
			max_connections: 10,
		}
	}
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct NatsConfig {
	/// The URI to use for connecting to Nats
	pub servers: Vec<String>,

	/// The username to use for authentication (user-pass auth)
	pub username: Option<String>,

	/// The password to use for authentication (user-pass auth)
	pub password: Option<String>,

	/// The token to use for authentication (token auth)
	pub token: Option<String>,
}

impl Default for NatsConfig {
	fn default() -> Self {
		Self {
			servers: vec!["localhost:4222".into()],
			username: None,
			password: None,
			token: None,
		}
	}
}

fn cli() -> clap::Command {
	clap::Command::new(clap::crate_name!()).version(clap::crate_version!()).arg(
		clap::Arg::new(CONFIG_ARG_ID)
			.long(CONFIG_ARG_ID)
			.short('c')
			.help("The configuration file to use")
			.value_name("FILE")
			.action(clap::ArgAction::Set),
	)
}

fn env_source(vars: Option<::config::Map<String, String>>) -> ::config::Environment {
	::config::Environment::with_prefix(ENV_PREFIX)
		.prefix_separator("_")
		.separator("__")
		.source(vars)
}

/// Builds `C` from an optional TOML file followed by the `PLANET_*`
/// variables. When `vars` is `None` the process environment is read.
///
/// Environment values stay strings until deserialization, so each one is
/// converted to the type of the field it lands in.
pub fn load<C: DeserializeOwned>(file: Option<(&str, bool)>, vars: Option<::config::Map<String, String>>) -> anyhow::Result<C> {
	let mut builder = ::config::Config::builder();

	if let Some((path, required)) = file {
		builder = builder.add_source(::config::File::new(path, ::config::FileFormat::Toml).required(required));
	}

	builder
		.add_source(env_source(vars))
		.build()
		.context("failed to load config")?
		.try_deserialize()
		.context("failed to deserialize config")
}

/// Loads `C` from the config file, then applies environment overrides.
///
/// A path given with `--config` must exist. The fallback `config_file` is
/// allowed to be missing. Returns the config and the canonical path of the
/// file that was read, if any.
pub fn parse<C: DeserializeOwned>(enable_cli: bool, config_file: Option<String>) -> anyhow::Result<(C, Option<String>)> {
	let cli_path = if enable_cli {
		cli().get_matches().get_one::<String>(CONFIG_ARG_ID).cloned()
	} else {
		None
	};

	let key_provided = cli_path.is_some();
	let path = cli_path.or(config_file);

	let config = load(path.as_deref().map(|path| (path, key_provided)), None)?;

	let config_path = match path {
		Some(path) if std::path::Path::new(&path).is_file() => Some(
			std::fs::canonicalize(&path)
				.with_context(|| format!("failed to canonicalize config path: {path}"))?
				.display()
				.to_string(),
		),
		Some(path) => {
			tracing::debug!(path = %path, "config file not found, using defaults");
			None
		}
		None => None,
	};

	Ok((config, config_path))
}
