use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Notify;
use ulid::Ulid;

use self::lane::Lane;
use crate::broadcast::{announce, Broadcaster, ChatEvent};
use crate::config::StagingConfig;
use crate::models::{Message, NewMessage};
use crate::store::{MessageStore, StoreError};

mod lane;
mod worker;

pub use worker::FlushWorker;

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
	#[error("channel {channel_id} has too many staged messages")]
	Backpressure { channel_id: Ulid },
	#[error("message is not staged")]
	NotStaged,
	#[error("channel {channel_id} was deleted")]
	ChannelClosed { channel_id: Ulid },
	#[error("failed to persist staged messages: {source}")]
	Flush {
		/// Every channel with messages that stayed staged.
		channels: Vec<DelayedChannel>,
		#[source]
		source: StoreError,
	},
	#[error(transparent)]
	Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedChannel {
	pub planet_id: Ulid,
	pub channel_id: Ulid,
	pub staged: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
	/// Messages that were written and left staging.
	pub persisted: usize,
	/// Rows written by the flush, including messages that were edited or
	/// removed while it ran.
	pub written: usize,
	/// Messages that were edited during the flush and stay staged.
	pub retained: usize,
	/// Messages deleted from the durable store after being removed mid flush.
	pub deleted: u64,
}

/// Staged messages of a channel together with the ids that must be hidden
/// from durable reads.
#[derive(Debug, Clone, Default)]
pub struct StagedView {
	pub messages: Vec<Message>,
	pub tombstones: HashSet<Ulid>,
}

/// Write behind buffer for posted messages.
///
/// Every channel gets its own lane, locked independently. A lane assigns
/// indices, holds messages until a flush persists them, and serves reads,
/// edits and removals of the messages it holds. The store is never called
/// while a lane is locked.
pub struct StagingQueue {
	store: Arc<dyn MessageStore>,
	broadcaster: Arc<dyn Broadcaster>,
	max_staged_per_channel: usize,
	flush_threshold: usize,
	lanes: RwLock<HashMap<Ulid, Arc<Lane>>>,
	/// message id -> channel id
	locator: RwLock<HashMap<Ulid, Ulid>>,
	staged: AtomicUsize,
	revisions: AtomicU64,
	flush_lock: tokio::sync::Mutex<()>,
	threshold: Notify,
}

impl StagingQueue {
	pub fn new(store: Arc<dyn MessageStore>, broadcaster: Arc<dyn Broadcaster>, config: &StagingConfig) -> Self {
		Self {
			store,
			broadcaster,
			max_staged_per_channel: config.max_staged_per_channel,
			flush_threshold: config.flush_threshold,
			lanes: RwLock::new(HashMap::new()),
			locator: RwLock::new(HashMap::new()),
			staged: AtomicUsize::new(0),
			revisions: AtomicU64::new(0),
			flush_lock: tokio::sync::Mutex::new(()),
			threshold: Notify::new(),
		}
	}

	#[cfg(test)]
	pub(crate) fn located_count(&self) -> usize {
		self.locator.read().len()
	}

	/// Total number of staged messages across every channel.
	pub fn staged_count(&self) -> usize {
		self.staged.load(Ordering::SeqCst)
	}

	fn lane(&self, channel_id: Ulid) -> Option<Arc<Lane>> {
		self.lanes.read().get(&channel_id).cloned()
	}

	fn lane_or_create(&self, planet_id: Ulid, channel_id: Ulid) -> Arc<Lane> {
		if let Some(lane) = self.lane(channel_id) {
			return lane;
		}

		self.lanes
			.write()
			.entry(channel_id)
			.or_insert_with(|| Arc::new(Lane::new(planet_id, channel_id)))
			.clone()
	}

	fn next_revision(&self) -> u64 {
		self.revisions.fetch_add(1, Ordering::Relaxed) + 1
	}

	/// Assigns the message an id and the next index of its channel.
	///
	/// The first message of a channel in this process continues from the
	/// highest persisted index.
	pub async fn stage(&self, new_message: NewMessage) -> Result<(Ulid, i64), StagingError> {
		let lane = self.lane_or_create(new_message.planet_id, new_message.channel_id);

		let seed = *lane
			.seed
			.get_or_try_init(|| self.store.load_max_index(lane.channel_id))
			.await?;

		let (message, staged) = {
			let mut state = lane.state.lock();

			if state.closed {
				return Err(StagingError::ChannelClosed {
					channel_id: lane.channel_id,
				});
			}

			if state.messages.len() >= self.max_staged_per_channel {
				return Err(StagingError::Backpressure {
					channel_id: lane.channel_id,
				});
			}

			state.last_index = state.last_index.max(seed) + 1;

			let message = new_message.into_message(Ulid::new(), state.last_index);
			state.insert(message.clone(), self.next_revision());

			// A flush can only see the message once the lane is unlocked, so
			// it is located and counted before then.
			self.locator.write().insert(message.id, message.channel_id);
			let staged = self.staged.fetch_add(1, Ordering::SeqCst) + 1;

			(message, staged)
		};

		if staged >= self.flush_threshold {
			self.threshold.notify_one();
		}

		tracing::trace!(
			channel_id = %message.channel_id,
			message_id = %message.id,
			index = message.index,
			"message staged"
		);

		let assigned = (message.id, message.index);
		announce(self.broadcaster.as_ref(), ChatEvent::MessageStaged { message }).await;

		Ok(assigned)
	}

	/// Up to `max` staged messages below `before_index`, newest first.
	pub fn get_staged(&self, channel_id: Ulid, max: usize, before_index: Option<i64>) -> Vec<Message> {
		self.view(channel_id, max, before_index).messages
	}

	pub fn view(&self, channel_id: Ulid, max: usize, before_index: Option<i64>) -> StagedView {
		let Some(lane) = self.lane(channel_id) else {
			return StagedView::default();
		};

		let state = lane.state.lock();

		let messages = state
			.messages
			.range(..before_index.unwrap_or(i64::MAX))
			.rev()
			.take(max)
			.map(|(_, entry)| entry.message.clone())
			.collect();

		StagedView {
			messages,
			tombstones: state.tombstones.clone(),
		}
	}

	pub fn get(&self, message_id: Ulid) -> Option<Message> {
		let channel_id = self.locator.read().get(&message_id).copied()?;
		let lane = self.lane(channel_id)?;

		let mut state = lane.state.lock();
		state.get_mut(message_id).map(|entry| entry.message.clone())
	}

	pub fn tombstones(&self, channel_id: Ulid) -> HashSet<Ulid> {
		let Some(lane) = self.lane(channel_id) else {
			return HashSet::new();
		};

		let state = lane.state.lock();
		state.tombstones.clone()
	}

	/// True if the message was removed during a flush and is still waiting to
	/// be deleted from the durable store.
	pub fn is_tombstoned(&self, channel_id: Ulid, message_id: Ulid) -> bool {
		let Some(lane) = self.lane(channel_id) else {
			return false;
		};

		let state = lane.state.lock();
		state.tombstones.contains(&message_id)
	}

	/// Removes a staged message. Returns None if it is not staged.
	pub fn remove(&self, message_id: Ulid) -> Option<Message> {
		let channel_id = self.locator.read().get(&message_id).copied()?;
		let lane = self.lane(channel_id)?;

		let mut state = lane.state.lock();
		let entry = state.remove(message_id)?;

		self.locator.write().remove(&message_id);
		self.staged.fetch_sub(1, Ordering::SeqCst);
		drop(state);

		Some(entry.message)
	}

	/// Replaces the content of a staged message.
	pub fn edit_in_place(&self, message_id: Ulid, content: impl Into<String>) -> Result<Message, StagingError> {
		let channel_id = self
			.locator
			.read()
			.get(&message_id)
			.copied()
			.ok_or(StagingError::NotStaged)?;
		let lane = self.lane(channel_id).ok_or(StagingError::NotStaged)?;

		let revision = self.next_revision();

		let mut state = lane.state.lock();
		let entry = state.get_mut(message_id).ok_or(StagingError::NotStaged)?;

		entry.message.content = content.into();
		entry.message.edited_at = Some(Utc::now());
		entry.revision = revision;

		Ok(entry.message.clone())
	}

	/// Resolves once the staged count crossed the flush threshold.
	pub async fn threshold_crossed(&self) {
		self.threshold.notified().await;
	}

	/// Persists every staged message in a single transaction.
	///
	/// New messages staged while the store call runs are not part of it. On
	/// failure every message stays staged.
	pub async fn flush(&self) -> Result<FlushReport, StagingError> {
		let _guard = self.flush_lock.lock().await;

		let lanes = self.lanes.read().values().cloned().collect::<Vec<_>>();

		let mut batch = Vec::new();
		let mut snapshot = Vec::with_capacity(lanes.len());
		let mut has_tombstones = false;

		for lane in lanes {
			let (revisions, tombstoned) = {
				let mut state = lane.state.lock();
				let tombstoned = !state.tombstones.is_empty();

				let revisions = state
					.messages
					.values()
					.map(|entry| {
						batch.push(entry.message.clone());
						(entry.message.id, entry.revision)
					})
					.collect::<Vec<_>>();

				state.in_flight.extend(revisions.iter().map(|(id, _)| *id));
				(revisions, tombstoned)
			};

			has_tombstones |= tombstoned;
			if !revisions.is_empty() || tombstoned {
				snapshot.push((lane, revisions));
			}
		}

		if batch.is_empty() && !has_tombstones {
			return Ok(FlushReport::default());
		}

		if !batch.is_empty() {
			if let Err(source) = self.store.persist_messages_batch(&batch).await {
				let channels = snapshot
					.iter()
					.map(|(lane, _)| {
						let mut state = lane.state.lock();
						state.in_flight.clear();

						DelayedChannel {
							planet_id: lane.planet_id,
							channel_id: lane.channel_id,
							staged: state.messages.len(),
						}
					})
					.filter(|channel| channel.staged > 0)
					.collect();

				return Err(StagingError::Flush { channels, source });
			}
		}

		let mut report = FlushReport::default();
		let mut persisted_ids = Vec::with_capacity(batch.len());
		let mut tombstones = Vec::new();

		for (lane, revisions) in &snapshot {
			let mut state = lane.state.lock();

			for (id, revision) in revisions {
				if state.remove_persisted(*id, *revision) {
					persisted_ids.push(*id);
				} else if state.ids.contains_key(id) {
					report.retained += 1;
				}
			}

			state.in_flight.clear();
			tombstones.extend(state.tombstones.iter().copied());
		}

		report.persisted = persisted_ids.len();
		report.written = batch.len();

		if !persisted_ids.is_empty() {
			let mut locator = self.locator.write();
			for id in &persisted_ids {
				locator.remove(id);
			}
		}
		self.staged.fetch_sub(persisted_ids.len(), Ordering::SeqCst);

		if !tombstones.is_empty() {
			match self.store.delete_messages(&tombstones).await {
				Ok(deleted) => {
					report.deleted = deleted;
					for (lane, _) in &snapshot {
						let mut state = lane.state.lock();
						for id in &tombstones {
							state.tombstones.remove(id);
						}
					}
				}
				Err(err) => {
					tracing::warn!(
						error = %err,
						count = tombstones.len(),
						"failed to delete messages removed during flush, retrying next cycle"
					);
				}
			}
		}

		tracing::debug!(
			persisted = report.persisted,
			written = report.written,
			retained = report.retained,
			deleted = report.deleted,
			"flushed staged messages"
		);

		Ok(report)
	}

	/// Discards the staged messages of a deleted channel and deletes its
	/// durable ones. Messages can no longer be staged to the channel
	/// afterwards.
	///
	/// Waits for a running flush, so nothing of the channel is written after
	/// this returns. Returns the number of staged and of durable messages
	/// dropped.
	pub async fn purge_channel(&self, planet_id: Ulid, channel_id: Ulid) -> Result<(usize, u64), StoreError> {
		let _guard = self.flush_lock.lock().await;

		let lane = self.lane_or_create(planet_id, channel_id);

		let discarded = {
			let mut state = lane.state.lock();
			let ids = state.close();

			let mut locator = self.locator.write();
			for id in &ids {
				locator.remove(id);
			}
			self.staged.fetch_sub(ids.len(), Ordering::SeqCst);

			ids.len()
		};

		let deleted = self.store.delete_channel_messages(channel_id).await?;

		Ok((discarded, deleted))
	}

	pub(crate) async fn announce_delayed(&self, channels: &[DelayedChannel], attempt: u32) {
		for channel in channels {
			announce(
				self.broadcaster.as_ref(),
				ChatEvent::FlushDelayed {
					planet_id: channel.planet_id,
					channel_id: channel.channel_id,
					staged: channel.staged,
					attempt,
				},
			)
			.await;
		}
	}
}
