use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::context::Context;
use common::{logging, signal};
use platform_chat::config::AppConfig;
use platform_chat::global;
use tokio::signal::unix::SignalKind;
use tokio::{select, time};

#[tokio::main]
async fn main() -> Result<()> {
	let (config, config_file) = common::config::parse::<AppConfig>(true, Some("config.toml".to_string()))?;

	logging::init(&config.logging.level, config.logging.mode)?;

	if let Some(file) = &config_file {
		tracing::info!(file = file, "loaded config from file");
	}

	tracing::debug!("config: {:#?}", config);

	let db = global::setup_database(&config).await?;
	let nats = global::setup_nats(&config).await?;

	let (ctx, handler) = Context::new();

	let global = Arc::new(global::GlobalState::new(config, db, nats, ctx));

	let flush_worker = global.platform.flush_worker(&global.config);
	let flush_future = tokio::spawn(flush_worker.run(global.ctx.clone()));

	// Listen on both sigint and sigterm and cancel the context when either is received
	let mut signal_handler = signal::SignalHandler::new()
		.with_signal(SignalKind::interrupt())?
		.with_signal(SignalKind::terminate())?;

	let shutdown_timeout = global.config.staging.shutdown_timeout;

	select! {
		r = flush_future => tracing::error!("flush worker stopped unexpectedly: {:?}", r),
		_ = signal_handler.recv() => tracing::info!("shutting down"),
	}

	// We cannot have a context in scope when we cancel the handler, otherwise it will deadlock.
	drop(global);

	tracing::info!("waiting for tasks to finish");

	select! {
		_ = time::sleep(shutdown_timeout + Duration::from_secs(5)) => tracing::warn!("force shutting down"),
		_ = signal_handler.recv() => tracing::warn!("force shutting down"),
		_ = handler.cancel() => tracing::info!("shutdown complete"),
	}

	Ok(())
}
