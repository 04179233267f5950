use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::models::{Channel, ChannelKind, Member, Message, PermissionsNode, Role};

mod memory;
mod postgres;

pub use memory::{MemoryStore, PersistPause};
pub use postgres::PgStore;

/// Upper bound on the ancestor chain a store will return. A deeper chain is
/// always the result of a cycle.
pub const MAX_CHAIN_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
	#[error("migration error: {0}")]
	Migrate(#[from] sqlx::migrate::MigrateError),
	#[error("store unavailable: {0}")]
	Unavailable(String),
	#[error("corrupt row: {0}")]
	Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
	#[error("a bit is both allowed and denied")]
	MaskOverlap,
	#[error("a node already exists for this role and target: {existing}")]
	Duplicate { existing: Ulid },
	#[error("node {id} cannot be moved to a different role or target")]
	KeyChanged { id: Ulid },
	#[error(transparent)]
	Store(#[from] StoreError),
}

/// Planet topology: members, roles and the channel tree.
#[async_trait::async_trait]
pub trait PlanetStore: Send + Sync {
	async fn load_member(&self, member_id: Ulid) -> Result<Option<Member>, StoreError>;

	/// Every role the member holds, including the planet's default role,
	/// ordered by position.
	async fn load_roles_for_member(&self, member: &Member) -> Result<Vec<Role>, StoreError>;

	async fn load_role(&self, role_id: Ulid) -> Result<Option<Role>, StoreError>;

	/// Every role of the planet ordered by position.
	async fn load_roles_for_planet(&self, planet_id: Ulid) -> Result<Vec<Role>, StoreError>;

	async fn load_channel(&self, channel_id: Ulid) -> Result<Option<Channel>, StoreError>;

	/// Channels whose parent is `channel_id`.
	async fn load_children(&self, channel_id: Ulid) -> Result<Vec<Channel>, StoreError>;

	/// `[target, parent, grandparent, ...]` following `parent_id` links.
	///
	/// The walk stops at a root, at a parent that does not exist, right after
	/// an id repeats, or after [`MAX_CHAIN_DEPTH`] entries. The caller is
	/// responsible for validating the result. Empty if the target does not
	/// exist.
	async fn load_ancestor_chain(&self, target_id: Ulid) -> Result<Vec<Channel>, StoreError>;

	async fn update_channel_parent(&self, channel_id: Ulid, parent_id: Option<Ulid>) -> Result<(), StoreError>;

	async fn update_channel_inherits(&self, channel_id: Ulid, inherits_perms: bool) -> Result<(), StoreError>;

	/// Applies every position in a single atomic step.
	async fn update_role_positions(&self, planet_id: Ulid, positions: &[(Ulid, u32)]) -> Result<(), StoreError>;

	async fn delete_channel(&self, channel_id: Ulid) -> Result<(), StoreError>;

	/// Deletes the role and unassigns it from every member.
	async fn delete_role(&self, role_id: Ulid) -> Result<(), StoreError>;
}

/// Per role permission overrides.
///
/// The store enforces the node invariants but never checks authority.
#[async_trait::async_trait]
pub trait NodeStore: Send + Sync {
	async fn get(&self, role_id: Ulid, target_id: Ulid, target_type: ChannelKind)
		-> Result<Option<PermissionsNode>, StoreError>;

	/// Inserts or updates the node keyed by its role, target and target type.
	async fn put(&self, node: &PermissionsNode) -> Result<(), NodeError>;

	/// Returns the deleted node, if there was one.
	async fn delete(
		&self,
		role_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
	) -> Result<Option<PermissionsNode>, StoreError>;

	async fn all_for_planet(&self, planet_id: Ulid) -> Result<Vec<PermissionsNode>, StoreError>;

	/// Every node held by one of `role_ids` on one of `target_ids`.
	async fn nodes_for(&self, role_ids: &[Ulid], target_ids: &[Ulid]) -> Result<Vec<PermissionsNode>, StoreError>;

	async fn delete_for_target(&self, target_id: Ulid) -> Result<u64, StoreError>;

	async fn delete_for_role(&self, role_id: Ulid) -> Result<u64, StoreError>;
}

/// Durable message storage.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
	/// Upserts every message by id in a single transaction.
	async fn persist_messages_batch(&self, messages: &[Message]) -> Result<(), StoreError>;

	/// The highest persisted index of the channel, 0 if it has no messages.
	async fn load_max_index(&self, channel_id: Ulid) -> Result<i64, StoreError>;

	/// Up to `count` messages with an index below `before_index`, newest first.
	async fn load_messages(
		&self,
		channel_id: Ulid,
		before_index: Option<i64>,
		count: usize,
	) -> Result<Vec<Message>, StoreError>;

	async fn load_message(&self, message_id: Ulid) -> Result<Option<Message>, StoreError>;

	async fn update_message(
		&self,
		message_id: Ulid,
		content: &str,
		edited_at: DateTime<Utc>,
	) -> Result<Option<Message>, StoreError>;

	/// Returns the number of messages deleted.
	async fn delete_messages(&self, message_ids: &[Ulid]) -> Result<u64, StoreError>;

	async fn delete_channel_messages(&self, channel_id: Ulid) -> Result<u64, StoreError>;
}
