use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use ulid::Ulid;

use crate::broadcast::{announce, Broadcaster, ChatEvent};
use crate::gate::{AuthToken, DenyReason, Gate};
use crate::models::{Channel, ChannelKind, ChannelPermission, Member, Message, NewMessage, TokenScope};
use crate::staging::{StagingError, StagingQueue};
use crate::store::{MessageStore, PlanetStore, StoreError};

pub const MAX_CONTENT_LENGTH: usize = 2048;
pub const MAX_EMBED_LENGTH: usize = 65535;
pub const MAX_MESSAGES_PER_READ: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
	#[error("denied: {0}")]
	Denied(DenyReason),
	#[error("message must have content or an embed")]
	Empty,
	#[error("content is longer than {MAX_CONTENT_LENGTH} characters")]
	ContentTooLong,
	#[error("embed is longer than {MAX_EMBED_LENGTH} characters")]
	EmbedTooLong,
	#[error("at most {MAX_MESSAGES_PER_READ} messages can be read at once")]
	TooManyRequested,
	#[error("the replied to message is not in this channel")]
	ReplyNotFound,
	#[error("message not found")]
	NotFound,
	#[error(transparent)]
	Staging(#[from] StagingError),
	#[error(transparent)]
	Store(#[from] StoreError),
}

impl From<DenyReason> for MessageError {
	fn from(reason: DenyReason) -> Self {
		Self::Denied(reason)
	}
}

/// A message as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostMessage {
	pub channel_id: Ulid,
	pub content: String,
	pub embed_data: Option<String>,
	pub attachments: Vec<String>,
	pub reply_to_id: Option<Ulid>,
}

impl PostMessage {
	pub fn new(channel_id: Ulid, content: impl Into<String>) -> Self {
		Self {
			channel_id,
			content: content.into(),
			..Default::default()
		}
	}
}

fn validate(content: &str, embed_data: Option<&str>) -> Result<(), MessageError> {
	if content.is_empty() && embed_data.map_or(true, str::is_empty) {
		return Err(MessageError::Empty);
	}

	if content.chars().count() > MAX_CONTENT_LENGTH {
		return Err(MessageError::ContentTooLong);
	}

	if embed_data.is_some_and(|embed| embed.chars().count() > MAX_EMBED_LENGTH) {
		return Err(MessageError::EmbedTooLong);
	}

	Ok(())
}

/// Every message operation. Posts, edits and deletes go through the staging
/// queue, reads merge it with the durable store.
pub struct MessageService {
	gate: Arc<Gate>,
	queue: Arc<StagingQueue>,
	planets: Arc<dyn PlanetStore>,
	store: Arc<dyn MessageStore>,
	broadcaster: Arc<dyn Broadcaster>,
}

impl MessageService {
	pub fn new(
		gate: Arc<Gate>,
		queue: Arc<StagingQueue>,
		planets: Arc<dyn PlanetStore>,
		store: Arc<dyn MessageStore>,
		broadcaster: Arc<dyn Broadcaster>,
	) -> Self {
		Self {
			gate,
			queue,
			planets,
			store,
			broadcaster,
		}
	}

	/// Only chat channels hold messages.
	async fn channel(&self, channel_id: Ulid) -> Result<Channel, MessageError> {
		self.planets
			.load_channel(channel_id)
			.await?
			.filter(|channel| channel.kind == ChannelKind::Chat)
			.ok_or(MessageError::Denied(DenyReason::TargetNotFound))
	}

	async fn authorize(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		channel_id: Ulid,
		permission: ChannelPermission,
	) -> Result<Member, MessageError> {
		let channel = self.channel(channel_id).await?;

		Ok(self
			.gate
			.authorize_member(
				token,
				TokenScope::Messages,
				actor_member_id,
				channel.id,
				channel.kind,
				permission,
			)
			.await??)
	}

	/// The message from whichever layer currently holds it.
	async fn find(&self, message_id: Ulid) -> Result<Option<Message>, MessageError> {
		if let Some(message) = self.queue.get(message_id) {
			return Ok(Some(message));
		}

		let Some(message) = self.store.load_message(message_id).await? else {
			return Ok(None);
		};

		if self.queue.is_tombstoned(message.channel_id, message.id) {
			return Ok(None);
		}

		Ok(Some(message))
	}

	/// Finds a message the actor is allowed to read. A message in a channel
	/// the actor cannot read is reported as missing.
	async fn visible(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		message_id: Ulid,
	) -> Result<(Message, Member), MessageError> {
		let message = self.find(message_id).await?.ok_or(MessageError::NotFound)?;

		match self
			.authorize(token, actor_member_id, message.channel_id, ChannelPermission::ViewMessages)
			.await
		{
			Ok(member) => Ok((message, member)),
			Err(MessageError::Denied(_)) => Err(MessageError::NotFound),
			Err(err) => Err(err),
		}
	}

	/// Stages a new message and returns its id and index.
	pub async fn post(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		request: PostMessage,
	) -> Result<(Ulid, i64), MessageError> {
		validate(&request.content, request.embed_data.as_deref())?;

		let mut permission = ChannelPermission::PostMessages;
		if request.embed_data.is_some() {
			permission |= ChannelPermission::Embed;
		}
		if !request.attachments.is_empty() {
			permission |= ChannelPermission::AttachContent;
		}

		let member = self
			.authorize(token, actor_member_id, request.channel_id, permission)
			.await?;

		if let Some(reply_to_id) = request.reply_to_id {
			match self.find(reply_to_id).await? {
				Some(reply) if reply.channel_id == request.channel_id => {}
				_ => return Err(MessageError::ReplyNotFound),
			}
		}

		let staged = self
			.queue
			.stage(NewMessage {
				planet_id: member.planet_id,
				channel_id: request.channel_id,
				author_id: member.id,
				author_user_id: member.user_id,
				content: request.content,
				embed_data: request.embed_data,
				attachments: request.attachments,
				reply_to_id: request.reply_to_id,
			})
			.await
			.map_err(|err| match err {
				StagingError::ChannelClosed { .. } => MessageError::Denied(DenyReason::TargetNotFound),
				err => err.into(),
			})?;

		Ok(staged)
	}

	/// Up to `count` messages below `before_index`, newest first.
	pub async fn recent_messages(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		channel_id: Ulid,
		count: usize,
		before_index: Option<i64>,
	) -> Result<Vec<Message>, MessageError> {
		if count > MAX_MESSAGES_PER_READ {
			return Err(MessageError::TooManyRequested);
		}

		self.authorize(token, actor_member_id, channel_id, ChannelPermission::ViewMessages)
			.await?;

		self.load_recent(channel_id, count, before_index).await
	}

	/// Merges the staged and the durable layer.
	///
	/// The staged layer is read first. A message persisted in between is then
	/// found in the durable layer, one that is in both keeps its staged copy.
	pub async fn load_recent(
		&self,
		channel_id: Ulid,
		count: usize,
		before_index: Option<i64>,
	) -> Result<Vec<Message>, MessageError> {
		if count == 0 {
			return Ok(Vec::new());
		}

		let staged = self.queue.view(channel_id, count, before_index);

		let durable = self
			.store
			.load_messages(
				channel_id,
				before_index,
				count + staged.messages.len() + staged.tombstones.len(),
			)
			.await?;

		let mut hidden = staged.tombstones;
		hidden.extend(self.queue.tombstones(channel_id));

		Ok(merge(staged.messages, durable, &hidden, count))
	}

	pub async fn get_message(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		message_id: Ulid,
	) -> Result<Message, MessageError> {
		let (message, _) = self.visible(token, actor_member_id, message_id).await?;

		Ok(message)
	}

	/// Replaces the content of the actor's own message.
	pub async fn edit(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		message_id: Ulid,
		content: String,
	) -> Result<Message, MessageError> {
		let (message, member) = self.visible(token, actor_member_id, message_id).await?;

		validate(&content, message.embed_data.as_deref())?;

		if message.author_id != member.id {
			return Err(DenyReason::BitNotGranted.into());
		}

		self.authorize(token, actor_member_id, message.channel_id, ChannelPermission::PostMessages)
			.await?;

		let edited = match self.queue.edit_in_place(message_id, content.as_str()) {
			Ok(edited) => edited,
			Err(StagingError::NotStaged) => self
				.store
				.update_message(message_id, &content, Utc::now())
				.await?
				.ok_or(MessageError::NotFound)?,
			Err(err) => return Err(err.into()),
		};

		announce(
			self.broadcaster.as_ref(),
			ChatEvent::MessageEdited {
				message: edited.clone(),
			},
		)
		.await;

		Ok(edited)
	}

	/// Deletes a message. Authors may delete their own messages, anyone else
	/// needs `ManageMessages`.
	pub async fn delete(&self, token: &AuthToken, actor_member_id: Ulid, message_id: Ulid) -> Result<(), MessageError> {
		let (message, member) = self.visible(token, actor_member_id, message_id).await?;

		if message.author_id != member.id {
			self.authorize(token, actor_member_id, message.channel_id, ChannelPermission::ManageMessages)
				.await?;
		}

		if self.queue.remove(message_id).is_none() && self.store.delete_messages(&[message_id]).await? == 0 {
			return Err(MessageError::NotFound);
		}

		tracing::debug!(
			channel_id = %message.channel_id,
			message_id = %message_id,
			actor = %actor_member_id,
			"message deleted"
		);

		announce(
			self.broadcaster.as_ref(),
			ChatEvent::MessageDeleted {
				planet_id: message.planet_id,
				channel_id: message.channel_id,
				message_id,
			},
		)
		.await;

		Ok(())
	}
}

/// Newest first, staged copies win, hidden ids are dropped.
pub fn merge(staged: Vec<Message>, durable: Vec<Message>, hidden: &HashSet<Ulid>, count: usize) -> Vec<Message> {
	let mut merged = HashMap::with_capacity(staged.len() + durable.len());

	for message in staged {
		merged.insert(message.id, message);
	}

	for message in durable {
		if !hidden.contains(&message.id) {
			merged.entry(message.id).or_insert(message);
		}
	}

	let mut messages = merged.into_values().collect::<Vec<_>>();
	messages.sort_by(|a, b| b.index.cmp(&a.index));
	messages.truncate(count);
	messages
}
