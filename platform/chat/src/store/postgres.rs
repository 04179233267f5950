use chrono::{DateTime, Utc};
use ulid::Ulid;
use uuid::Uuid;

use super::{MessageStore, NodeError, NodeStore, PlanetStore, StoreError, MAX_CHAIN_DEPTH};
use crate::models::{
	Channel, ChannelKind, ChannelPermission, Member, Message, PermissionsNode, PlanetPermission, Role,
};

/// Postgres backed implementation of every store.
#[derive(Clone)]
pub struct PgStore {
	pool: sqlx::PgPool,
}

impl PgStore {
	pub fn new(pool: sqlx::PgPool) -> Self {
		Self { pool }
	}

	pub async fn migrate(&self) -> Result<(), StoreError> {
		sqlx::migrate!("./migrations").run(&self.pool).await?;
		Ok(())
	}
}

#[derive(sqlx::FromRow)]
struct RoleRow {
	id: Uuid,
	planet_id: Uuid,
	name: String,
	position: i64,
	base_permissions: i64,
	planet_permissions: i64,
	is_admin: bool,
	is_default: bool,
}

impl TryFrom<RoleRow> for Role {
	type Error = StoreError;

	fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
		Ok(Self {
			id: row.id.into(),
			planet_id: row.planet_id.into(),
			name: row.name,
			position: u32::try_from(row.position)
				.map_err(|_| StoreError::Corrupt(format!("role {} has position {}", row.id, row.position)))?,
			base_permissions: ChannelPermission::from(row.base_permissions as u64),
			planet_permissions: PlanetPermission::from(row.planet_permissions as u64),
			is_admin: row.is_admin,
			is_default: row.is_default,
		})
	}
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
	id: Uuid,
	planet_id: Uuid,
	parent_id: Option<Uuid>,
	kind: i16,
	name: String,
	inherits_perms: bool,
	is_default: bool,
}

fn channel_kind(id: Uuid, kind: i16) -> Result<ChannelKind, StoreError> {
	ChannelKind::from_i16(kind).ok_or_else(|| StoreError::Corrupt(format!("{id} has unknown channel kind {kind}")))
}

impl TryFrom<ChannelRow> for Channel {
	type Error = StoreError;

	fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
		Ok(Self {
			id: row.id.into(),
			planet_id: row.planet_id.into(),
			parent_id: row.parent_id.map(Into::into),
			kind: channel_kind(row.id, row.kind)?,
			name: row.name,
			inherits_perms: row.inherits_perms,
			is_default: row.is_default,
		})
	}
}

#[derive(sqlx::FromRow)]
struct NodeRow {
	id: Uuid,
	planet_id: Uuid,
	role_id: Uuid,
	target_id: Uuid,
	target_type: i16,
	allow_mask: i64,
	deny_mask: i64,
}

impl TryFrom<NodeRow> for PermissionsNode {
	type Error = StoreError;

	fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
		Ok(Self {
			id: row.id.into(),
			planet_id: row.planet_id.into(),
			role_id: row.role_id.into(),
			target_id: row.target_id.into(),
			target_type: channel_kind(row.id, row.target_type)?,
			allow_mask: ChannelPermission::from(row.allow_mask as u64),
			deny_mask: ChannelPermission::from(row.deny_mask as u64),
		})
	}
}

#[derive(sqlx::FromRow)]
struct MessageRow {
	id: Uuid,
	planet_id: Uuid,
	channel_id: Uuid,
	author_id: Uuid,
	author_user_id: Uuid,
	content: String,
	embed_data: Option<String>,
	attachments: Vec<String>,
	reply_to_id: Option<Uuid>,
	message_index: i64,
	staged_at: DateTime<Utc>,
	edited_at: Option<DateTime<Utc>>,
}

impl From<MessageRow> for Message {
	fn from(row: MessageRow) -> Self {
		Self {
			id: row.id.into(),
			planet_id: row.planet_id.into(),
			channel_id: row.channel_id.into(),
			author_id: row.author_id.into(),
			author_user_id: row.author_user_id.into(),
			content: row.content,
			embed_data: row.embed_data,
			attachments: row.attachments,
			reply_to_id: row.reply_to_id.map(Into::into),
			index: row.message_index,
			staged_at: row.staged_at,
			edited_at: row.edited_at,
		}
	}
}

fn uuids(ids: &[Ulid]) -> Vec<Uuid> {
	ids.iter().copied().map(Uuid::from).collect()
}

const ROLE_COLUMNS: &str = "id, planet_id, name, position, base_permissions, planet_permissions, is_admin, is_default";
const CHANNEL_COLUMNS: &str = "id, planet_id, parent_id, kind, name, inherits_perms, is_default";
const NODE_COLUMNS: &str = "id, planet_id, role_id, target_id, target_type, allow_mask, deny_mask";
const MESSAGE_COLUMNS: &str = "id, planet_id, channel_id, author_id, author_user_id, content, embed_data, attachments, \
                               reply_to_id, message_index, staged_at, edited_at";

#[async_trait::async_trait]
impl PlanetStore for PgStore {
	async fn load_member(&self, member_id: Ulid) -> Result<Option<Member>, StoreError> {
		let Some((id, planet_id, user_id)) = sqlx::query_as::<_, (Uuid, Uuid, Uuid)>(
			"SELECT id, planet_id, user_id FROM members WHERE id = $1",
		)
		.bind(Uuid::from(member_id))
		.fetch_optional(&self.pool)
		.await?
		else {
			return Ok(None);
		};

		let role_ids = sqlx::query_scalar::<_, Uuid>(
			"SELECT role_id FROM member_roles WHERE member_id = $1 ORDER BY assigned_at, role_id",
		)
		.bind(id)
		.fetch_all(&self.pool)
		.await?;

		Ok(Some(Member {
			id: id.into(),
			planet_id: planet_id.into(),
			user_id: user_id.into(),
			role_ids: role_ids.into_iter().map(Into::into).collect(),
		}))
	}

	async fn load_roles_for_member(&self, member: &Member) -> Result<Vec<Role>, StoreError> {
		sqlx::query_as::<_, RoleRow>(&format!(
			"SELECT {ROLE_COLUMNS} FROM roles WHERE planet_id = $1 AND (is_default OR id = ANY($2)) ORDER BY position, id"
		))
		.bind(Uuid::from(member.planet_id))
		.bind(uuids(&member.role_ids))
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(Role::try_from)
		.collect()
	}

	async fn load_role(&self, role_id: Ulid) -> Result<Option<Role>, StoreError> {
		sqlx::query_as::<_, RoleRow>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"))
			.bind(Uuid::from(role_id))
			.fetch_optional(&self.pool)
			.await?
			.map(Role::try_from)
			.transpose()
	}

	async fn load_roles_for_planet(&self, planet_id: Ulid) -> Result<Vec<Role>, StoreError> {
		sqlx::query_as::<_, RoleRow>(&format!(
			"SELECT {ROLE_COLUMNS} FROM roles WHERE planet_id = $1 ORDER BY position, id"
		))
		.bind(Uuid::from(planet_id))
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(Role::try_from)
		.collect()
	}

	async fn load_channel(&self, channel_id: Ulid) -> Result<Option<Channel>, StoreError> {
		sqlx::query_as::<_, ChannelRow>(&format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = $1"))
			.bind(Uuid::from(channel_id))
			.fetch_optional(&self.pool)
			.await?
			.map(Channel::try_from)
			.transpose()
	}

	async fn load_children(&self, channel_id: Ulid) -> Result<Vec<Channel>, StoreError> {
		sqlx::query_as::<_, ChannelRow>(&format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE parent_id = $1"))
			.bind(Uuid::from(channel_id))
			.fetch_all(&self.pool)
			.await?
			.into_iter()
			.map(Channel::try_from)
			.collect()
	}

	async fn load_ancestor_chain(&self, target_id: Ulid) -> Result<Vec<Channel>, StoreError> {
		// A cycle keeps producing rows until the depth limit, the caller sees
		// the repeated ids.
		sqlx::query_as::<_, ChannelRow>(&format!(
			"WITH RECURSIVE chain AS (
				SELECT {CHANNEL_COLUMNS}, 0 AS depth FROM channels WHERE id = $1
				UNION ALL
				SELECT p.id, p.planet_id, p.parent_id, p.kind, p.name, p.inherits_perms, p.is_default, chain.depth + 1
				FROM channels p JOIN chain ON p.id = chain.parent_id
				WHERE chain.depth + 1 < $2
			)
			SELECT {CHANNEL_COLUMNS} FROM chain ORDER BY depth"
		))
		.bind(Uuid::from(target_id))
		.bind(MAX_CHAIN_DEPTH as i32)
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(Channel::try_from)
		.collect()
	}

	async fn update_channel_parent(&self, channel_id: Ulid, parent_id: Option<Ulid>) -> Result<(), StoreError> {
		sqlx::query("UPDATE channels SET parent_id = $2 WHERE id = $1")
			.bind(Uuid::from(channel_id))
			.bind(parent_id.map(Uuid::from))
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	async fn update_channel_inherits(&self, channel_id: Ulid, inherits_perms: bool) -> Result<(), StoreError> {
		sqlx::query("UPDATE channels SET inherits_perms = $2 WHERE id = $1")
			.bind(Uuid::from(channel_id))
			.bind(inherits_perms)
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	async fn delete_channel(&self, channel_id: Ulid) -> Result<(), StoreError> {
		sqlx::query("DELETE FROM channels WHERE id = $1")
			.bind(Uuid::from(channel_id))
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	async fn update_role_positions(&self, planet_id: Ulid, positions: &[(Ulid, u32)]) -> Result<(), StoreError> {
		let mut tx = self.pool.begin().await?;

		for (role_id, position) in positions {
			sqlx::query("UPDATE roles SET position = $3 WHERE id = $1 AND planet_id = $2")
				.bind(Uuid::from(*role_id))
				.bind(Uuid::from(planet_id))
				.bind(*position as i64)
				.execute(&mut *tx)
				.await?;
		}

		tx.commit().await?;

		Ok(())
	}

	async fn delete_role(&self, role_id: Ulid) -> Result<(), StoreError> {
		sqlx::query("DELETE FROM roles WHERE id = $1")
			.bind(Uuid::from(role_id))
			.execute(&self.pool)
			.await?;

		Ok(())
	}
}

#[async_trait::async_trait]
impl NodeStore for PgStore {
	async fn get(
		&self,
		role_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
	) -> Result<Option<PermissionsNode>, StoreError> {
		sqlx::query_as::<_, NodeRow>(&format!(
			"SELECT {NODE_COLUMNS} FROM permission_nodes WHERE role_id = $1 AND target_id = $2 AND target_type = $3"
		))
		.bind(Uuid::from(role_id))
		.bind(Uuid::from(target_id))
		.bind(target_type.as_i16())
		.fetch_optional(&self.pool)
		.await?
		.map(PermissionsNode::try_from)
		.transpose()
	}

	async fn put(&self, node: &PermissionsNode) -> Result<(), NodeError> {
		if !node.is_consistent() {
			return Err(NodeError::MaskOverlap);
		}

		let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

		let by_key = sqlx::query_scalar::<_, Uuid>(
			"SELECT id FROM permission_nodes WHERE role_id = $1 AND target_id = $2 AND target_type = $3 FOR UPDATE",
		)
		.bind(Uuid::from(node.role_id))
		.bind(Uuid::from(node.target_id))
		.bind(node.target_type.as_i16())
		.fetch_optional(&mut *tx)
		.await
		.map_err(StoreError::from)?;

		if let Some(existing) = by_key.map(Ulid::from).filter(|id| *id != node.id) {
			return Err(NodeError::Duplicate { existing });
		}

		let by_id = sqlx::query_as::<_, NodeRow>(&format!(
			"SELECT {NODE_COLUMNS} FROM permission_nodes WHERE id = $1 FOR UPDATE"
		))
		.bind(Uuid::from(node.id))
		.fetch_optional(&mut *tx)
		.await
		.map_err(StoreError::from)?
		.map(PermissionsNode::try_from)
		.transpose()?;

		if let Some(existing) = by_id {
			if existing.key() != node.key() || existing.planet_id != node.planet_id {
				return Err(NodeError::KeyChanged { id: node.id });
			}
		}

		sqlx::query(
			"INSERT INTO permission_nodes (id, planet_id, role_id, target_id, target_type, allow_mask, deny_mask)
			VALUES ($1, $2, $3, $4, $5, $6, $7)
			ON CONFLICT (id) DO UPDATE SET allow_mask = EXCLUDED.allow_mask, deny_mask = EXCLUDED.deny_mask",
		)
		.bind(Uuid::from(node.id))
		.bind(Uuid::from(node.planet_id))
		.bind(Uuid::from(node.role_id))
		.bind(Uuid::from(node.target_id))
		.bind(node.target_type.as_i16())
		.bind(node.allow_mask.bits() as i64)
		.bind(node.deny_mask.bits() as i64)
		.execute(&mut *tx)
		.await
		.map_err(StoreError::from)?;

		tx.commit().await.map_err(StoreError::from)?;

		Ok(())
	}

	async fn delete(
		&self,
		role_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
	) -> Result<Option<PermissionsNode>, StoreError> {
		sqlx::query_as::<_, NodeRow>(&format!(
			"DELETE FROM permission_nodes WHERE role_id = $1 AND target_id = $2 AND target_type = $3 RETURNING {NODE_COLUMNS}"
		))
		.bind(Uuid::from(role_id))
		.bind(Uuid::from(target_id))
		.bind(target_type.as_i16())
		.fetch_optional(&self.pool)
		.await?
		.map(PermissionsNode::try_from)
		.transpose()
	}

	async fn all_for_planet(&self, planet_id: Ulid) -> Result<Vec<PermissionsNode>, StoreError> {
		sqlx::query_as::<_, NodeRow>(&format!(
			"SELECT {NODE_COLUMNS} FROM permission_nodes WHERE planet_id = $1 ORDER BY id"
		))
		.bind(Uuid::from(planet_id))
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(PermissionsNode::try_from)
		.collect()
	}

	async fn nodes_for(&self, role_ids: &[Ulid], target_ids: &[Ulid]) -> Result<Vec<PermissionsNode>, StoreError> {
		sqlx::query_as::<_, NodeRow>(&format!(
			"SELECT {NODE_COLUMNS} FROM permission_nodes WHERE role_id = ANY($1) AND target_id = ANY($2)"
		))
		.bind(uuids(role_ids))
		.bind(uuids(target_ids))
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(PermissionsNode::try_from)
		.collect()
	}

	async fn delete_for_target(&self, target_id: Ulid) -> Result<u64, StoreError> {
		Ok(sqlx::query("DELETE FROM permission_nodes WHERE target_id = $1")
			.bind(Uuid::from(target_id))
			.execute(&self.pool)
			.await?
			.rows_affected())
	}

	async fn delete_for_role(&self, role_id: Ulid) -> Result<u64, StoreError> {
		Ok(sqlx::query("DELETE FROM permission_nodes WHERE role_id = $1")
			.bind(Uuid::from(role_id))
			.execute(&self.pool)
			.await?
			.rows_affected())
	}
}

#[async_trait::async_trait]
impl MessageStore for PgStore {
	async fn persist_messages_batch(&self, messages: &[Message]) -> Result<(), StoreError> {
		let mut tx = self.pool.begin().await?;

		for message in messages {
			sqlx::query(
				"INSERT INTO messages (id, planet_id, channel_id, author_id, author_user_id, content, embed_data, \
				 attachments, reply_to_id, message_index, staged_at, edited_at)
				VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
				ON CONFLICT (id) DO UPDATE SET
					content = EXCLUDED.content,
					embed_data = EXCLUDED.embed_data,
					attachments = EXCLUDED.attachments,
					edited_at = EXCLUDED.edited_at",
			)
			.bind(Uuid::from(message.id))
			.bind(Uuid::from(message.planet_id))
			.bind(Uuid::from(message.channel_id))
			.bind(Uuid::from(message.author_id))
			.bind(Uuid::from(message.author_user_id))
			.bind(&message.content)
			.bind(&message.embed_data)
			.bind(&message.attachments)
			.bind(message.reply_to_id.map(Uuid::from))
			.bind(message.index)
			.bind(message.staged_at)
			.bind(message.edited_at)
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;

		Ok(())
	}

	async fn load_max_index(&self, channel_id: Ulid) -> Result<i64, StoreError> {
		let max = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(message_index) FROM messages WHERE channel_id = $1")
			.bind(Uuid::from(channel_id))
			.fetch_one(&self.pool)
			.await?;

		Ok(max.unwrap_or(0))
	}

	async fn load_messages(
		&self,
		channel_id: Ulid,
		before_index: Option<i64>,
		count: usize,
	) -> Result<Vec<Message>, StoreError> {
		Ok(sqlx::query_as::<_, MessageRow>(&format!(
			"SELECT {MESSAGE_COLUMNS} FROM messages
			WHERE channel_id = $1 AND ($2::BIGINT IS NULL OR message_index < $2)
			ORDER BY message_index DESC LIMIT $3"
		))
		.bind(Uuid::from(channel_id))
		.bind(before_index)
		.bind(count as i64)
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(Message::from)
		.collect())
	}

	async fn load_message(&self, message_id: Ulid) -> Result<Option<Message>, StoreError> {
		Ok(
			sqlx::query_as::<_, MessageRow>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
				.bind(Uuid::from(message_id))
				.fetch_optional(&self.pool)
				.await?
				.map(Message::from),
		)
	}

	async fn update_message(
		&self,
		message_id: Ulid,
		content: &str,
		edited_at: DateTime<Utc>,
	) -> Result<Option<Message>, StoreError> {
		Ok(sqlx::query_as::<_, MessageRow>(&format!(
			"UPDATE messages SET content = $2, edited_at = $3 WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
		))
		.bind(Uuid::from(message_id))
		.bind(content)
		.bind(edited_at)
		.fetch_optional(&self.pool)
		.await?
		.map(Message::from))
	}

	async fn delete_messages(&self, message_ids: &[Ulid]) -> Result<u64, StoreError> {
		Ok(sqlx::query("DELETE FROM messages WHERE id = ANY($1)")
			.bind(uuids(message_ids))
			.execute(&self.pool)
			.await?
			.rows_affected())
	}

	async fn delete_channel_messages(&self, channel_id: Ulid) -> Result<u64, StoreError> {
		Ok(sqlx::query("DELETE FROM messages WHERE channel_id = $1")
			.bind(Uuid::from(channel_id))
			.execute(&self.pool)
			.await?
			.rows_affected())
	}
}
