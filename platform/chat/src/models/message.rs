use chrono::{DateTime, Utc};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// A chat message, either staged in memory or persisted.
pub struct Message {
	/// The unique identifier for the message, assigned when staged.
	pub id: Ulid,
	/// The planet containing the channel.
	pub planet_id: Ulid,
	/// The channel the message was posted to.
	pub channel_id: Ulid,
	/// The member who posted the message.
	pub author_id: Ulid,
	/// The user behind the member.
	pub author_user_id: Ulid,
	/// The content of the message.
	pub content: String,
	/// Serialized embed payload.
	pub embed_data: Option<String>,
	/// Attachment urls.
	pub attachments: Vec<String>,
	/// The message this one replies to.
	pub reply_to_id: Option<Ulid>,
	/// Position in the channel's message stream, assigned when staged.
	pub index: i64,
	/// The time the message was staged.
	pub staged_at: DateTime<Utc>,
	/// The time the message was last edited.
	pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// A message as submitted by a poster, before it gets an id and index.
pub struct NewMessage {
	pub planet_id: Ulid,
	pub channel_id: Ulid,
	pub author_id: Ulid,
	pub author_user_id: Ulid,
	pub content: String,
	pub embed_data: Option<String>,
	pub attachments: Vec<String>,
	pub reply_to_id: Option<Ulid>,
}

impl NewMessage {
	pub(crate) fn into_message(self, id: Ulid, index: i64) -> Message {
		Message {
			id,
			planet_id: self.planet_id,
			channel_id: self.channel_id,
			author_id: self.author_id,
			author_user_id: self.author_user_id,
			content: self.content,
			embed_data: self.embed_data,
			attachments: self.attachments,
			reply_to_id: self.reply_to_id,
			index,
			staged_at: Utc::now(),
			edited_at: None,
		}
	}
}
