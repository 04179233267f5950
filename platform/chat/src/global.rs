use std::io;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use common::context::Context;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::ConnectOptions;

use crate::broadcast::{Broadcaster, NatsBroadcaster};
use crate::config::AppConfig;
use crate::gate::Gate;
use crate::messages::MessageService;
use crate::permissions::PermissionResolver;
use crate::staging::{FlushWorker, StagingQueue};
use crate::store::{MessageStore, NodeStore, PgStore, PlanetStore, StoreError};

/// The wired chat core.
pub struct Platform {
	pub resolver: Arc<PermissionResolver>,
	pub gate: Arc<Gate>,
	pub queue: Arc<StagingQueue>,
	pub messages: MessageService,
}

impl Platform {
	pub fn new(
		config: &AppConfig,
		planets: Arc<dyn PlanetStore>,
		nodes: Arc<dyn NodeStore>,
		store: Arc<dyn MessageStore>,
		broadcaster: Arc<dyn Broadcaster>,
	) -> Self {
		let resolver = Arc::new(
			PermissionResolver::new(planets.clone(), nodes.clone()).with_cache_ttl(config.permissions.cache_ttl),
		);
		let queue = Arc::new(StagingQueue::new(store.clone(), broadcaster.clone(), &config.staging));
		let gate = Arc::new(Gate::new(resolver.clone(), planets.clone(), nodes, queue.clone()));
		let messages = MessageService::new(gate.clone(), queue.clone(), planets, store, broadcaster);

		Self {
			resolver,
			gate,
			queue,
			messages,
		}
	}

	pub fn flush_worker(&self, config: &AppConfig) -> FlushWorker {
		FlushWorker::new(self.queue.clone(), config.staging.clone())
	}
}

pub struct GlobalState {
	pub config: AppConfig,
	pub ctx: Context,
	pub db: Arc<sqlx::PgPool>,
	pub nats: async_nats::Client,
	pub platform: Platform,
}

impl GlobalState {
	pub fn new(config: AppConfig, db: Arc<sqlx::PgPool>, nats: async_nats::Client, ctx: Context) -> Self {
		let store = Arc::new(PgStore::new((*db).clone()));
		let broadcaster = Arc::new(NatsBroadcaster::new(nats.clone()));

		let platform = Platform::new(&config, store.clone(), store.clone(), store, broadcaster);

		Self {
			config,
			ctx,
			db,
			nats,
			platform,
		}
	}
}

pub async fn setup_database(config: &AppConfig) -> Result<Arc<sqlx::PgPool>, StoreError> {
	let db = PgPoolOptions::new()
		.max_connections(config.database.max_connections)
		.connect_with(
			PgConnectOptions::from_str(&config.database.uri)?
				.disable_statement_logging()
				.to_owned(),
		)
		.await?;

	PgStore::new(db.clone()).migrate().await?;

	tracing::info!("connected to database");

	Ok(Arc::new(db))
}

#[derive(thiserror::Error, Debug)]
pub enum SetupNatsError {
	#[error("failed to parse address: {0}")]
	AddressParse(io::Error),
	#[error("connect error: {0}")]
	ConnectError(#[from] async_nats::ConnectError),
}

pub async fn setup_nats(config: &AppConfig) -> Result<async_nats::Client, SetupNatsError> {
	let mut options = async_nats::ConnectOptions::new()
		.connection_timeout(Duration::from_secs(5))
		.name(&config.name)
		.retry_on_initial_connect();

	if let Some(user) = &config.nats.username {
		options = options.user_and_password(user.clone(), config.nats.password.clone().unwrap_or_default())
	} else if let Some(token) = &config.nats.token {
		options = options.token(token.clone())
	}

	let nats_addrs = config
		.nats
		.servers
		.iter()
		.map(|s| s.parse::<async_nats::ServerAddr>())
		.collect::<Result<Vec<_>, _>>()
		.map_err(SetupNatsError::AddressParse)?;

	let nats = options.connect(nats_addrs).await?;

	tracing::info!("connected to nats");

	Ok(nats)
}
