use std::time::Duration;

use ulid::Ulid;

use super::fixtures::Planet;
use crate::models::ChannelPermission;
use crate::permissions::PermissionCache;

#[tokio::test(start_paused = true)]
async fn test_cache_entries_expire() {
	let cache = PermissionCache::new(Duration::from_secs(30));
	let (planet, member, target) = (Ulid::new(), Ulid::new(), Ulid::new());

	assert!(cache.insert(planet, member, target, ChannelPermission::View, cache.generation(planet)));
	assert_eq!(cache.get(planet, member, target), Some(ChannelPermission::View));

	tokio::time::advance(Duration::from_secs(31)).await;
	assert_eq!(cache.get(planet, member, target), None);
	assert!(cache.is_empty());
}

#[test]
fn test_stale_generation_is_not_stored() {
	let cache = PermissionCache::new(Duration::from_secs(30));
	let (planet, member, target) = (Ulid::new(), Ulid::new(), Ulid::new());

	let generation = cache.generation(planet);
	cache.invalidate_planet(planet);

	assert!(!cache.insert(planet, member, target, ChannelPermission::View, generation));
	assert_eq!(cache.get(planet, member, target), None);
}

#[test]
fn test_invalidation_is_per_planet() {
	let cache = PermissionCache::new(Duration::from_secs(30));
	let (a, b, member, target) = (Ulid::new(), Ulid::new(), Ulid::new(), Ulid::new());

	cache.insert(a, member, target, ChannelPermission::View, cache.generation(a));
	cache.insert(b, member, target, ChannelPermission::View, cache.generation(b));

	cache.invalidate_planet(a);

	assert_eq!(cache.get(a, member, target), None);
	assert_eq!(cache.get(b, member, target), Some(ChannelPermission::View));
}

#[tokio::test]
async fn test_resolver_serves_cached_results_until_invalidated() {
	let planet = Planet::new(ChannelPermission::View);
	let channel = planet.channel("general", None);
	let member = planet.member(&[]);

	let resolver = planet.resolver().with_cache_ttl(Duration::from_secs(30));
	assert_eq!(
		resolver.resolve(member.id, channel.id).await.unwrap(),
		ChannelPermission::View
	);

	// Written behind the resolver's back, so the cached value is still served.
	planet
		.node(&planet.everyone, &channel, ChannelPermission::none(), ChannelPermission::View)
		.await;
	assert_eq!(
		resolver.resolve(member.id, channel.id).await.unwrap(),
		ChannelPermission::View
	);

	resolver.invalidate_planet(planet.id);
	assert_eq!(
		resolver.resolve(member.id, channel.id).await.unwrap(),
		ChannelPermission::none()
	);
}

#[test]
fn test_zero_ttl_disables_cache() {
	let planet = Planet::chatty();
	assert!(planet.resolver().with_cache_ttl(Duration::ZERO).cache().is_none());
}
