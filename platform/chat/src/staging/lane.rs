use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use ulid::Ulid;

use crate::models::Message;

pub(super) struct Entry {
	pub message: Message,
	/// Bumped on every edit, a flush only drops the revision it persisted.
	pub revision: u64,
}

#[derive(Default)]
pub(super) struct LaneState {
	pub last_index: i64,
	pub messages: BTreeMap<i64, Entry>,
	pub ids: HashMap<Ulid, i64>,
	/// Messages included in the running flush.
	pub in_flight: HashSet<Ulid>,
	/// Messages removed while in flight. Hidden from reads until the flush
	/// has deleted them from the durable store.
	pub tombstones: HashSet<Ulid>,
	/// Set once the channel is deleted.
	pub closed: bool,
}

impl LaneState {
	pub fn insert(&mut self, message: Message, revision: u64) {
		self.ids.insert(message.id, message.index);
		self.messages.insert(message.index, Entry { message, revision });
	}

	pub fn get_mut(&mut self, message_id: Ulid) -> Option<&mut Entry> {
		let index = self.ids.get(&message_id)?;
		self.messages.get_mut(index)
	}

	pub fn remove(&mut self, message_id: Ulid) -> Option<Entry> {
		let index = self.ids.remove(&message_id)?;
		let entry = self.messages.remove(&index)?;

		if self.in_flight.contains(&message_id) {
			self.tombstones.insert(message_id);
		}

		Some(entry)
	}

	/// Discards every staged message and closes the lane. Returns the ids
	/// that were staged.
	pub fn close(&mut self) -> Vec<Ulid> {
		self.closed = true;
		self.messages.clear();
		self.in_flight.clear();
		self.tombstones.clear();
		self.ids.drain().map(|(id, _)| id).collect()
	}

	/// Drops the entry only if it was not edited since `revision`.
	pub fn remove_persisted(&mut self, message_id: Ulid, revision: u64) -> bool {
		let Some(index) = self.ids.get(&message_id).copied() else {
			return false;
		};

		if self.messages.get(&index).map(|e| e.revision) != Some(revision) {
			return false;
		}

		self.ids.remove(&message_id);
		self.messages.remove(&index);
		true
	}
}

/// The staged messages of a single channel.
pub(super) struct Lane {
	pub planet_id: Ulid,
	pub channel_id: Ulid,
	/// Highest persisted index, loaded once per process.
	pub seed: OnceCell<i64>,
	pub state: Mutex<LaneState>,
}

impl Lane {
	pub fn new(planet_id: Ulid, channel_id: Ulid) -> Self {
		Self {
			planet_id,
			channel_id,
			seed: OnceCell::new(),
			state: Mutex::new(LaneState::default()),
		}
	}
}
