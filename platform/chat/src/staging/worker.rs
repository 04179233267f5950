use std::sync::Arc;
use std::time::Duration;

use common::context::Context;
use common::prelude::FutureTimeout;

use super::{StagingError, StagingQueue};
use crate::config::StagingConfig;

/// Drives the periodic flush of a [`StagingQueue`].
pub struct FlushWorker {
	queue: Arc<StagingQueue>,
	config: StagingConfig,
}

impl FlushWorker {
	pub fn new(queue: Arc<StagingQueue>, config: StagingConfig) -> Self {
		Self { queue, config }
	}

	/// Delay before the next attempt after `failures` consecutive failures.
	pub fn backoff(&self, failures: u32) -> Duration {
		if failures == 0 {
			return self.config.flush_interval;
		}

		let factor = 1u32 << (failures - 1).min(16);
		self.config
			.retry_backoff
			.saturating_mul(factor)
			.min(self.config.max_retry_backoff)
	}

	/// Runs until the context is cancelled, then flushes one last time.
	pub async fn run(self, ctx: Context) {
		let mut failures = 0u32;

		loop {
			let delay = self.backoff(failures);

			tokio::select! {
				_ = ctx.done() => break,
				_ = tokio::time::sleep(delay) => {},
				_ = self.queue.threshold_crossed(), if failures == 0 => {
					tracing::debug!("flush threshold crossed");
				},
			}

			match self.queue.flush().await {
				Ok(report) => {
					if failures > 0 {
						tracing::info!(failures, persisted = report.persisted, "flush recovered");
					}
					failures = 0;
				}
				Err(StagingError::Flush { channels, source }) => {
					failures += 1;

					let staged = channels.iter().map(|c| c.staged).sum::<usize>();
					if failures > self.config.alert_after_failures {
						tracing::error!(
							failures,
							staged,
							channels = channels.len(),
							retry_in = ?self.backoff(failures),
							error = %source,
							"flush keeps failing"
						);
					} else {
						tracing::warn!(
							failures,
							staged,
							retry_in = ?self.backoff(failures),
							error = %source,
							"flush failed"
						);
					}

					self.queue.announce_delayed(&channels, failures).await;
				}
				Err(err) => {
					failures += 1;
					tracing::warn!(failures, error = %err, "flush failed");
				}
			}
		}

		// The final flush runs in its own task so hitting the timeout never
		// interrupts the transaction.
		let queue = self.queue.clone();
		let handle = tokio::spawn(async move { queue.flush().await });

		match handle.timeout(self.config.shutdown_timeout).await {
			Ok(Ok(Ok(report))) => {
				tracing::info!(persisted = report.persisted, "final flush complete");
			}
			Ok(Ok(Err(err))) => {
				tracing::error!(error = %err, "final flush failed");
			}
			Ok(Err(err)) => {
				tracing::error!(error = %err, "final flush panicked");
			}
			Err(_) => {
				tracing::error!(timeout = ?self.config.shutdown_timeout, "final flush timed out");
			}
		}

		let lost = self.queue.staged_count();
		if lost > 0 {
			tracing::error!(lost, "staged messages were not persisted before shutdown");
		}
	}
}
