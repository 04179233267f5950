use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use ulid::Ulid;

use super::{MessageStore, NodeError, NodeStore, PlanetStore, StoreError, MAX_CHAIN_DEPTH};
use crate::models::{Channel, ChannelKind, Member, Message, NodeKey, PermissionsNode, Role};

#[derive(Default)]
struct Inner {
	members: HashMap<Ulid, Member>,
	roles: HashMap<Ulid, Role>,
	channels: HashMap<Ulid, Channel>,
	nodes: HashMap<Ulid, PermissionsNode>,
	node_keys: HashMap<NodeKey, Ulid>,
	messages: HashMap<Ulid, Message>,
}

/// Holds the next persist until released.
#[derive(Clone)]
pub struct PersistPause {
	entered: Arc<Notify>,
	release: Arc<Notify>,
}

impl PersistPause {
	/// Waits until a persist is blocked on this pause.
	pub async fn entered(&self) {
		self.entered.notified().await;
	}

	pub fn release(&self) {
		self.release.notify_one();
	}
}

/// An in process implementation of every store, used by tests and local
/// development. Failures can be injected into message persistence.
#[derive(Default)]
pub struct MemoryStore {
	inner: RwLock<Inner>,
	fail_persists: AtomicUsize,
	persist_calls: AtomicUsize,
	pause: Mutex<Option<PersistPause>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert_member(&self, member: Member) {
		self.inner.write().members.insert(member.id, member);
	}

	pub fn insert_role(&self, role: Role) {
		self.inner.write().roles.insert(role.id, role);
	}

	pub fn insert_channel(&self, channel: Channel) {
		self.inner.write().channels.insert(channel.id, channel);
	}

	/// Overwrites a channel without any validation.
	pub fn replace_channel(&self, channel: Channel) {
		self.insert_channel(channel);
	}

	/// Makes the next `count` calls to `persist_messages_batch` fail.
	pub fn fail_next_persists(&self, count: usize) {
		self.fail_persists.store(count, Ordering::SeqCst);
	}

	/// Blocks the next call to `persist_messages_batch` until the returned
	/// pause is released.
	pub fn pause_next_persist(&self) -> PersistPause {
		let pause = PersistPause {
			entered: Arc::new(Notify::new()),
			release: Arc::new(Notify::new()),
		};
		*self.pause.lock() = Some(pause.clone());
		pause
	}

	pub fn persist_calls(&self) -> usize {
		self.persist_calls.load(Ordering::SeqCst)
	}

	pub fn message_count(&self) -> usize {
		self.inner.read().messages.len()
	}

	pub fn contains_message(&self, message_id: Ulid) -> bool {
		self.inner.read().messages.contains_key(&message_id)
	}
}

#[async_trait::async_trait]
impl PlanetStore for MemoryStore {
	async fn load_member(&self, member_id: Ulid) -> Result<Option<Member>, StoreError> {
		Ok(self.inner.read().members.get(&member_id).cloned())
	}

	async fn load_roles_for_member(&self, member: &Member) -> Result<Vec<Role>, StoreError> {
		let inner = self.inner.read();

		let mut roles = inner
			.roles
			.values()
			.filter(|role| {
				role.planet_id == member.planet_id && (role.is_default || member.role_ids.contains(&role.id))
			})
			.cloned()
			.collect::<Vec<_>>();

		roles.sort_by_key(|role| (role.position, role.id));
		Ok(roles)
	}

	async fn load_role(&self, role_id: Ulid) -> Result<Option<Role>, StoreError> {
		Ok(self.inner.read().roles.get(&role_id).cloned())
	}

	async fn load_roles_for_planet(&self, planet_id: Ulid) -> Result<Vec<Role>, StoreError> {
		let inner = self.inner.read();

		let mut roles = inner
			.roles
			.values()
			.filter(|role| role.planet_id == planet_id)
			.cloned()
			.collect::<Vec<_>>();

		roles.sort_by_key(|role| (role.position, role.id));
		Ok(roles)
	}

	async fn load_channel(&self, channel_id: Ulid) -> Result<Option<Channel>, StoreError> {
		Ok(self.inner.read().channels.get(&channel_id).cloned())
	}

	async fn load_children(&self, channel_id: Ulid) -> Result<Vec<Channel>, StoreError> {
		Ok(self
			.inner
			.read()
			.channels
			.values()
			.filter(|c| c.parent_id == Some(channel_id))
			.cloned()
			.collect())
	}

	async fn load_ancestor_chain(&self, target_id: Ulid) -> Result<Vec<Channel>, StoreError> {
		let inner = self.inner.read();

		let mut chain: Vec<Channel> = Vec::new();
		let mut next = Some(target_id);

		while let Some(id) = next {
			let Some(channel) = inner.channels.get(&id) else {
				break;
			};

			let repeated = chain.iter().any(|c| c.id == id);
			chain.push(channel.clone());

			if repeated || chain.len() >= MAX_CHAIN_DEPTH {
				break;
			}

			next = channel.parent_id;
		}

		Ok(chain)
	}

	async fn update_channel_parent(&self, channel_id: Ulid, parent_id: Option<Ulid>) -> Result<(), StoreError> {
		if let Some(channel) = self.inner.write().channels.get_mut(&channel_id) {
			channel.parent_id = parent_id;
		}

		Ok(())
	}

	async fn update_channel_inherits(&self, channel_id: Ulid, inherits_perms: bool) -> Result<(), StoreError> {
		if let Some(channel) = self.inner.write().channels.get_mut(&channel_id) {
			channel.inherits_perms = inherits_perms;
		}

		Ok(())
	}

	async fn delete_channel(&self, channel_id: Ulid) -> Result<(), StoreError> {
		let mut inner = self.inner.write();

		inner.channels.remove(&channel_id);
		for channel in inner.channels.values_mut() {
			if channel.parent_id == Some(channel_id) {
				channel.parent_id = None;
			}
		}

		Ok(())
	}

	async fn update_role_positions(&self, planet_id: Ulid, positions: &[(Ulid, u32)]) -> Result<(), StoreError> {
		let mut inner = self.inner.write();

		for (role_id, position) in positions {
			if let Some(role) = inner.roles.get_mut(role_id).filter(|r| r.planet_id == planet_id) {
				role.position = *position;
			}
		}

		Ok(())
	}

	async fn delete_role(&self, role_id: Ulid) -> Result<(), StoreError> {
		let mut inner = self.inner.write();

		inner.roles.remove(&role_id);
		for member in inner.members.values_mut() {
			member.role_ids.retain(|id| *id != role_id);
		}

		Ok(())
	}
}

#[async_trait::async_trait]
impl NodeStore for MemoryStore {
	async fn get(
		&self,
		role_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
	) -> Result<Option<PermissionsNode>, StoreError> {
		let inner = self.inner.read();

		let key = NodeKey {
			role_id,
			target_id,
			target_type,
		};

		Ok(inner.node_keys.get(&key).and_then(|id| inner.nodes.get(id)).cloned())
	}

	async fn put(&self, node: &PermissionsNode) -> Result<(), NodeError> {
		if !node.is_consistent() {
			return Err(NodeError::MaskOverlap);
		}

		let mut inner = self.inner.write();

		if let Some(existing) = inner.node_keys.get(&node.key()) {
			if *existing != node.id {
				return Err(NodeError::Duplicate { existing: *existing });
			}
		}

		if let Some(existing) = inner.nodes.get(&node.id) {
			if existing.key() != node.key() || existing.planet_id != node.planet_id {
				return Err(NodeError::KeyChanged { id: node.id });
			}
		}

		inner.node_keys.insert(node.key(), node.id);
		inner.nodes.insert(node.id, node.clone());

		Ok(())
	}

	async fn delete(
		&self,
		role_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
	) -> Result<Option<PermissionsNode>, StoreError> {
		let mut inner = self.inner.write();

		let key = NodeKey {
			role_id,
			target_id,
			target_type,
		};

		Ok(inner.node_keys.remove(&key).and_then(|id| inner.nodes.remove(&id)))
	}

	async fn all_for_planet(&self, planet_id: Ulid) -> Result<Vec<PermissionsNode>, StoreError> {
		let inner = self.inner.read();

		let mut nodes = inner
			.nodes
			.values()
			.filter(|node| node.planet_id == planet_id)
			.cloned()
			.collect::<Vec<_>>();

		nodes.sort_by_key(|node| node.id);
		Ok(nodes)
	}

	async fn nodes_for(&self, role_ids: &[Ulid], target_ids: &[Ulid]) -> Result<Vec<PermissionsNode>, StoreError> {
		let inner = self.inner.read();

		Ok(inner
			.nodes
			.values()
			.filter(|node| role_ids.contains(&node.role_id) && target_ids.contains(&node.target_id))
			.cloned()
			.collect())
	}

	async fn delete_for_target(&self, target_id: Ulid) -> Result<u64, StoreError> {
		let mut inner = self.inner.write();
		let before = inner.nodes.len();

		inner.nodes.retain(|_, node| node.target_id != target_id);
		inner.node_keys.retain(|key, _| key.target_id != target_id);

		Ok((before - inner.nodes.len()) as u64)
	}

	async fn delete_for_role(&self, role_id: Ulid) -> Result<u64, StoreError> {
		let mut inner = self.inner.write();
		let before = inner.nodes.len();

		inner.nodes.retain(|_, node| node.role_id != role_id);
		inner.node_keys.retain(|key, _| key.role_id != role_id);

		Ok((before - inner.nodes.len()) as u64)
	}
}

#[async_trait::async_trait]
impl MessageStore for MemoryStore {
	async fn persist_messages_batch(&self, messages: &[Message]) -> Result<(), StoreError> {
		self.persist_calls.fetch_add(1, Ordering::SeqCst);

		let pause = self.pause.lock().take();
		if let Some(pause) = pause {
			pause.entered.notify_one();
			pause.release.notified().await;
		}

		let failed = self
			.fail_persists
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if failed {
			return Err(StoreError::Unavailable("injected persist failure".into()));
		}

		let mut inner = self.inner.write();
		for message in messages {
			inner.messages.insert(message.id, message.clone());
		}

		Ok(())
	}

	async fn load_max_index(&self, channel_id: Ulid) -> Result<i64, StoreError> {
		Ok(self
			.inner
			.read()
			.messages
			.values()
			.filter(|m| m.channel_id == channel_id)
			.map(|m| m.index)
			.max()
			.unwrap_or(0))
	}

	async fn load_messages(
		&self,
		channel_id: Ulid,
		before_index: Option<i64>,
		count: usize,
	) -> Result<Vec<Message>, StoreError> {
		let inner = self.inner.read();

		let mut messages = inner
			.messages
			.values()
			.filter(|m| m.channel_id == channel_id && before_index.map_or(true, |before| m.index < before))
			.cloned()
			.collect::<Vec<_>>();

		messages.sort_by(|a, b| b.index.cmp(&a.index));
		messages.truncate(count);

		Ok(messages)
	}

	async fn load_message(&self, message_id: Ulid) -> Result<Option<Message>, StoreError> {
		Ok(self.inner.read().messages.get(&message_id).cloned())
	}

	async fn update_message(
		&self,
		message_id: Ulid,
		content: &str,
		edited_at: DateTime<Utc>,
	) -> Result<Option<Message>, StoreError> {
		let mut inner = self.inner.write();

		Ok(inner.messages.get_mut(&message_id).map(|message| {
			message.content = content.to_owned();
			message.edited_at = Some(edited_at);
			message.clone()
		}))
	}

	async fn delete_messages(&self, message_ids: &[Ulid]) -> Result<u64, StoreError> {
		let mut inner = self.inner.write();

		Ok(message_ids
			.iter()
			.filter(|id| inner.messages.remove(id).is_some())
			.count() as u64)
	}

	async fn delete_channel_messages(&self, channel_id: Ulid) -> Result<u64, StoreError> {
		let mut inner = self.inner.write();
		let before = inner.messages.len();

		inner.messages.retain(|_, m| m.channel_id != channel_id);

		Ok((before - inner.messages.len()) as u64)
	}
}
