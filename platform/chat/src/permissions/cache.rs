use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use ulid::Ulid;

use crate::models::ChannelPermission;

#[derive(Default)]
struct Partition {
	generation: u64,
	entries: HashMap<(Ulid, Ulid), (ChannelPermission, Instant)>,
}

/// Short lived cache of resolved channel permissions keyed by member and
/// target, partitioned per planet.
///
/// Every mutation of a planet's roles, nodes or channel tree must call
/// [`PermissionCache::invalidate_planet`] before returning. Invalidation bumps
/// the planet's generation, a result computed under an older generation is
/// never stored.
pub struct PermissionCache {
	ttl: Duration,
	planets: Mutex<HashMap<Ulid, Partition>>,
}

impl PermissionCache {
	pub fn new(ttl: Duration) -> Self {
		Self {
			ttl,
			planets: Mutex::new(HashMap::new()),
		}
	}

	pub fn generation(&self, planet_id: Ulid) -> u64 {
		self.planets.lock().get(&planet_id).map_or(0, |p| p.generation)
	}

	pub fn get(&self, planet_id: Ulid, member_id: Ulid, target_id: Ulid) -> Option<ChannelPermission> {
		let mut planets = self.planets.lock();
		let partition = planets.get_mut(&planet_id)?;

		let key = (member_id, target_id);
		match partition.entries.get(&key) {
			Some((permissions, expires_at)) if *expires_at > Instant::now() => Some(*permissions),
			Some(_) => {
				partition.entries.remove(&key);
				None
			}
			None => None,
		}
	}

	/// Stores a result computed while the planet was at `generation`.
	/// Returns false if the planet was invalidated in the meantime.
	pub fn insert(
		&self,
		planet_id: Ulid,
		member_id: Ulid,
		target_id: Ulid,
		permissions: ChannelPermission,
		generation: u64,
	) -> bool {
		let mut planets = self.planets.lock();
		let partition = planets.entry(planet_id).or_default();

		if partition.generation != generation {
			return false;
		}

		partition
			.entries
			.insert((member_id, target_id), (permissions, Instant::now() + self.ttl));

		true
	}

	pub fn invalidate_planet(&self, planet_id: Ulid) {
		let mut planets = self.planets.lock();
		let partition = planets.entry(planet_id).or_default();

		partition.generation += 1;
		partition.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.planets.lock().values().map(|p| p.entries.len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
