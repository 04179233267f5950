use bytes::Bytes;

use super::{BroadcastError, Broadcaster, ChatEvent};

/// Publishes events as JSON on `planet.{planet}.channel.{channel}.messages`.
#[derive(Clone)]
pub struct NatsBroadcaster {
	client: async_nats::Client,
}

impl NatsBroadcaster {
	pub fn new(client: async_nats::Client) -> Self {
		Self { client }
	}

	pub fn subject(event: &ChatEvent) -> String {
		format!("planet.{}.channel.{}.messages", event.planet_id(), event.channel_id())
	}
}

#[async_trait::async_trait]
impl Broadcaster for NatsBroadcaster {
	async fn publish(&self, event: &ChatEvent) -> Result<(), BroadcastError> {
		let payload = Bytes::from(serde_json::to_vec(event)?);

		self.client
			.publish(Self::subject(event), payload)
			.await
			.map_err(|err| BroadcastError::Publish(err.to_string()))
	}
}
