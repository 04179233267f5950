use ulid::Ulid;

use crate::models::Message;

mod nats;

pub use nats::NatsBroadcaster;

/// Real time events fanned out to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
	/// A message was accepted. It may not be durable yet.
	MessageStaged { message: Message },
	MessageEdited { message: Message },
	MessageDeleted {
		planet_id: Ulid,
		channel_id: Ulid,
		message_id: Ulid,
	},
	/// Persisting the channel's staged messages failed and will be retried.
	FlushDelayed {
		planet_id: Ulid,
		channel_id: Ulid,
		staged: usize,
		attempt: u32,
	},
}

impl ChatEvent {
	pub fn planet_id(&self) -> Ulid {
		match self {
			Self::MessageStaged { message } | Self::MessageEdited { message } => message.planet_id,
			Self::MessageDeleted { planet_id, .. } | Self::FlushDelayed { planet_id, .. } => *planet_id,
		}
	}

	pub fn channel_id(&self) -> Ulid {
		match self {
			Self::MessageStaged { message } | Self::MessageEdited { message } => message.channel_id,
			Self::MessageDeleted { channel_id, .. } | Self::FlushDelayed { channel_id, .. } => *channel_id,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
	#[error("failed to encode event: {0}")]
	Encode(#[from] serde_json::Error),
	#[error("failed to publish event: {0}")]
	Publish(String),
}

#[async_trait::async_trait]
pub trait Broadcaster: Send + Sync {
	async fn publish(&self, event: &ChatEvent) -> Result<(), BroadcastError>;
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

#[async_trait::async_trait]
impl Broadcaster for NoopBroadcaster {
	async fn publish(&self, _: &ChatEvent) -> Result<(), BroadcastError> {
		Ok(())
	}
}

/// Publishes the event. Failures are logged and otherwise ignored.
pub async fn announce(broadcaster: &dyn Broadcaster, event: ChatEvent) {
	if let Err(err) = broadcaster.publish(&event).await {
		tracing::warn!(
			planet_id = %event.planet_id(),
			channel_id = %event.channel_id(),
			error = %err,
			"failed to broadcast chat event"
		);
	}
}
