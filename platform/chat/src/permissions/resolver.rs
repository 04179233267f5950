use std::sync::Arc;
use std::time::Duration;

use ulid::Ulid;

use super::cache::PermissionCache;
use super::hierarchy::{self, HierarchyError};
use crate::models::{highest_authority, Channel, ChannelPermission, Member, PermissionsNode, PlanetPermission, Role};
use crate::store::{NodeStore, PlanetStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
	#[error("not a member of the planet")]
	NotAMember,
	#[error("target not found")]
	TargetNotFound,
	#[error("structural error: {0}")]
	Structural(#[from] HierarchyError),
	#[error(transparent)]
	Store(#[from] StoreError),
}

/// Computes effective channel permissions for planet members.
pub struct PermissionResolver {
	planets: Arc<dyn PlanetStore>,
	nodes: Arc<dyn NodeStore>,
	cache: Option<PermissionCache>,
}

impl PermissionResolver {
	pub fn new(planets: Arc<dyn PlanetStore>, nodes: Arc<dyn NodeStore>) -> Self {
		Self {
			planets,
			nodes,
			cache: None,
		}
	}

	/// Enables the result cache. A zero ttl leaves it disabled.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache = (!ttl.is_zero()).then(|| PermissionCache::new(ttl));
		self
	}

	pub fn cache(&self) -> Option<&PermissionCache> {
		self.cache.as_ref()
	}

	/// Drops every cached result for the planet. Called synchronously by every
	/// mutation of roles, nodes or the channel tree.
	pub fn invalidate_planet(&self, planet_id: Ulid) {
		if let Some(cache) = &self.cache {
			cache.invalidate_planet(planet_id);
		}
	}

	pub async fn load_member(&self, member_id: Ulid) -> Result<Member, ResolveError> {
		self.planets.load_member(member_id).await?.ok_or(ResolveError::NotAMember)
	}

	pub async fn resolve(&self, member_id: Ulid, target_id: Ulid) -> Result<ChannelPermission, ResolveError> {
		let member = self.load_member(member_id).await?;
		self.resolve_for(&member, target_id).await
	}

	pub async fn resolve_for(&self, member: &Member, target_id: Ulid) -> Result<ChannelPermission, ResolveError> {
		let generation = match &self.cache {
			Some(cache) => {
				if let Some(permissions) = cache.get(member.planet_id, member.id, target_id) {
					return Ok(permissions);
				}

				cache.generation(member.planet_id)
			}
			None => 0,
		};

		let roles = self.planets.load_roles_for_member(member).await?;
		let chain = self.load_chain(member, target_id).await?;

		let role_ids = roles.iter().map(|r| r.id).collect::<Vec<_>>();
		let target_ids = chain.iter().map(|c| c.id).collect::<Vec<_>>();
		let nodes = self.nodes.nodes_for(&role_ids, &target_ids).await?;

		let permissions = effective_permissions(&roles, &chain, &nodes);

		if let Some(cache) = &self.cache {
			cache.insert(member.planet_id, member.id, target_id, permissions, generation);
		}

		Ok(permissions)
	}

	/// Planet wide permissions of the member. Admin roles grant everything and
	/// planet view is always granted.
	pub async fn resolve_planet(&self, member: &Member) -> Result<PlanetPermission, ResolveError> {
		let roles = self.planets.load_roles_for_member(member).await?;
		Ok(planet_permissions(&roles))
	}

	async fn load_chain(&self, member: &Member, target_id: Ulid) -> Result<Vec<Channel>, ResolveError> {
		let chain = self.planets.load_ancestor_chain(target_id).await?;

		match chain.first() {
			None => return Err(ResolveError::TargetNotFound),
			Some(target) if target.planet_id != member.planet_id => return Err(ResolveError::TargetNotFound),
			Some(_) => {}
		}

		hierarchy::permission_chain(chain).map_err(|err| {
			tracing::error!(
				target_id = %target_id,
				planet_id = %member.planet_id,
				error = %err,
				"invalid channel hierarchy, denying"
			);
			ResolveError::Structural(err)
		})
	}
}

/// Applies the closest level's winning node to that role's base permissions.
///
/// Levels are visited from the target upward. At the first level where any of
/// the roles has a node, the role with the lowest position wins and the nodes
/// of every other role are ignored. With no node anywhere the base
/// permissions of the member's highest authority role are returned.
pub fn effective_permissions(roles: &[Role], chain: &[Channel], nodes: &[PermissionsNode]) -> ChannelPermission {
	for level in chain {
		let winner = highest_authority(roles.iter().filter(|role| {
			nodes
				.iter()
				.any(|n| n.role_id == role.id && n.target_id == level.id && n.target_type == level.kind)
		}));

		let Some(role) = winner else {
			continue;
		};

		let node = nodes
			.iter()
			.find(|n| n.role_id == role.id && n.target_id == level.id && n.target_type == level.kind);

		if let Some(node) = node {
			return node.apply(role.base_permissions);
		}
	}

	highest_authority(roles).map_or(ChannelPermission::none(), |role| role.base_permissions)
}

pub fn planet_permissions(roles: &[Role]) -> PlanetPermission {
	if roles.iter().any(|r| r.is_admin) {
		return PlanetPermission::full_control();
	}

	roles
		.iter()
		.fold(PlanetPermission::View, |acc, role| acc | role.planet_permissions)
}

/// The member's authority, the lowest position among their roles.
pub fn authority(roles: &[Role]) -> u32 {
	roles.iter().map(|r| r.position).min().unwrap_or(u32::MAX)
}
