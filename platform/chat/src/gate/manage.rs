use itertools::Itertools;
use ulid::Ulid;

use super::{AuthToken, DenyReason, Gate, GateError};
use crate::models::{ChannelKind, ChannelPermission, Member, PermissionsNode, PlanetPermission, TokenScope};
use crate::permissions::{authority, hierarchy};

impl Gate {
	async fn manager(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		permission: PlanetPermission,
	) -> Result<Member, GateError> {
		let member = self
			.token_member(token, TokenScope::PlanetManagement, actor_member_id)
			.await??;

		self.check_planet_member(&member, permission).await?.into_result()?;

		Ok(member)
	}

	/// Authorizes an edit of `role_id`'s node on a target.
	async fn node_manager(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		role_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
	) -> Result<Member, GateError> {
		let member = self.manager(token, actor_member_id, PlanetPermission::ManageRoles).await?;

		self.check_member(&member, target_id, target_type, ChannelPermission::ManagePermissions)
			.await?
			.into_result()?;

		self.check_authority_member(&member, role_id).await?.into_result()?;

		Ok(member)
	}

	/// Creates or updates a permission node.
	pub async fn put_node(&self, token: &AuthToken, actor_member_id: Ulid, node: PermissionsNode) -> Result<(), GateError> {
		let member = self
			.node_manager(token, actor_member_id, node.role_id, node.target_id, node.target_type)
			.await?;

		if node.planet_id != member.planet_id {
			return Err(DenyReason::TargetNotFound.into());
		}

		self.nodes.put(&node).await?;
		self.resolver.invalidate_planet(member.planet_id);

		tracing::info!(
			planet_id = %member.planet_id,
			actor = %member.id,
			node_id = %node.id,
			role_id = %node.role_id,
			target_id = %node.target_id,
			"permission node updated"
		);

		Ok(())
	}

	pub async fn delete_node(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		role_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
	) -> Result<Option<PermissionsNode>, GateError> {
		let member = self
			.node_manager(token, actor_member_id, role_id, target_id, target_type)
			.await?;

		let deleted = self.nodes.delete(role_id, target_id, target_type).await?;
		self.resolver.invalidate_planet(member.planet_id);

		if let Some(node) = &deleted {
			tracing::info!(
				planet_id = %member.planet_id,
				actor = %member.id,
				node_id = %node.id,
				"permission node deleted"
			);
		}

		Ok(deleted)
	}

	/// Moves a channel under another category, or to the top level.
	pub async fn move_channel(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		channel_id: Ulid,
		parent_id: Option<Ulid>,
	) -> Result<(), GateError> {
		let member = self.manager(token, actor_member_id, PlanetPermission::Manage).await?;

		let channel = match self.planets.load_channel(channel_id).await? {
			Some(channel) if channel.planet_id == member.planet_id => channel,
			_ => return Err(DenyReason::TargetNotFound.into()),
		};

		let (parent, parent_chain) = match parent_id {
			Some(parent_id) => {
				let Some(parent) = self.planets.load_channel(parent_id).await? else {
					return Err(DenyReason::TargetNotFound.into());
				};
				let chain = self.planets.load_ancestor_chain(parent_id).await?;
				(Some(parent), chain)
			}
			None => (None, Vec::new()),
		};

		if let Err(err) = hierarchy::validate_move(&channel, parent.as_ref(), &parent_chain) {
			tracing::warn!(
				channel_id = %channel.id,
				parent_id = ?parent_id,
				error = %err,
				"rejected channel move"
			);
			return Err(err.into());
		}

		self.planets.update_channel_parent(channel.id, parent_id).await?;
		self.resolver.invalidate_planet(member.planet_id);

		tracing::info!(
			planet_id = %member.planet_id,
			channel_id = %channel.id,
			parent_id = ?parent_id,
			"channel moved"
		);

		Ok(())
	}

	/// Deletes a channel together with its nodes and messages.
	///
	/// A category must be emptied first. Staged messages of the channel are
	/// discarded and nothing can be staged to it afterwards.
	pub async fn delete_channel(&self, token: &AuthToken, actor_member_id: Ulid, channel_id: Ulid) -> Result<(), GateError> {
		let member = self.manager(token, actor_member_id, PlanetPermission::Manage).await?;

		let channel = match self.planets.load_channel(channel_id).await? {
			Some(channel) if channel.planet_id == member.planet_id => channel,
			_ => return Err(DenyReason::TargetNotFound.into()),
		};

		if channel.is_category() && !self.planets.load_children(channel.id).await?.is_empty() {
			return Err(GateError::CategoryNotEmpty(channel.id));
		}

		let nodes = self.nodes.delete_for_target(channel.id).await?;
		self.planets.delete_channel(channel.id).await?;
		self.resolver.invalidate_planet(member.planet_id);

		let (discarded, deleted) = self.queue.purge_channel(channel.planet_id, channel.id).await?;

		tracing::info!(
			planet_id = %member.planet_id,
			actor = %member.id,
			channel_id = %channel.id,
			nodes,
			discarded,
			deleted,
			"channel deleted"
		);

		Ok(())
	}

	pub async fn set_inherits_perms(
		&self,
		token: &AuthToken,
		actor_member_id: Ulid,
		channel_id: Ulid,
		inherits_perms: bool,
	) -> Result<(), GateError> {
		let member = self.manager(token, actor_member_id, PlanetPermission::ManageRoles).await?;

		let channel = match self.planets.load_channel(channel_id).await? {
			Some(channel) if channel.planet_id == member.planet_id => channel,
			_ => return Err(DenyReason::TargetNotFound.into()),
		};

		self.check_member(&member, channel.id, channel.kind, ChannelPermission::ManagePermissions)
			.await?
			.into_result()?;

		self.planets.update_channel_inherits(channel.id, inherits_perms).await?;
		self.resolver.invalidate_planet(member.planet_id);

		Ok(())
	}

	/// Reorders every role of the actor's planet at once.
	///
	/// `order` must list every role exactly once, strongest first, with the
	/// default role last. The existing positions are handed out again in the
	/// new order so an unchanged order changes nothing. The actor must
	/// outrank every role that moves, both before and after the move.
	pub async fn reorder_roles(&self, token: &AuthToken, actor_member_id: Ulid, order: &[Ulid]) -> Result<(), GateError> {
		let member = self.manager(token, actor_member_id, PlanetPermission::ManageRoles).await?;

		let roles = self.planets.load_roles_for_planet(member.planet_id).await?;

		if order.len() != roles.len() || !order.iter().all_unique() || roles.iter().any(|r| !order.contains(&r.id)) {
			return Err(GateError::InvalidRoleOrder("order must list every role exactly once".into()));
		}

		if !order.last().is_some_and(|id| roles.iter().any(|r| r.id == *id && r.is_default)) {
			return Err(GateError::InvalidRoleOrder("the default role must be last".into()));
		}

		let positions = roles.iter().map(|r| r.position).sorted_unstable();

		let actor_authority = authority(&self.planets.load_roles_for_member(&member).await?);

		let mut changes = Vec::new();
		for (role_id, position) in order.iter().zip(positions) {
			let Some(role) = roles.iter().find(|r| r.id == *role_id) else {
				continue;
			};

			if role.position == position {
				continue;
			}

			if actor_authority >= role.position || actor_authority >= position {
				return Err(DenyReason::LowerAuthority.into());
			}

			changes.push((role.id, position));
		}

		if changes.is_empty() {
			return Ok(());
		}

		self.planets.update_role_positions(member.planet_id, &changes).await?;
		self.resolver.invalidate_planet(member.planet_id);

		tracing::info!(
			planet_id = %member.planet_id,
			actor = %member.id,
			changed = changes.len(),
			"roles reordered"
		);

		Ok(())
	}

	/// Deletes a role and every node attached to it.
	pub async fn delete_role(&self, token: &AuthToken, actor_member_id: Ulid, role_id: Ulid) -> Result<(), GateError> {
		let member = self.manager(token, actor_member_id, PlanetPermission::ManageRoles).await?;

		let role = match self.planets.load_role(role_id).await? {
			Some(role) if role.planet_id == member.planet_id => role,
			_ => return Err(DenyReason::TargetNotFound.into()),
		};

		if role.is_default {
			return Err(GateError::DefaultRole);
		}

		self.check_authority_member(&member, role.id).await?.into_result()?;

		let nodes = self.nodes.delete_for_role(role.id).await?;
		self.planets.delete_role(role.id).await?;
		self.resolver.invalidate_planet(member.planet_id);

		tracing::info!(
			planet_id = %member.planet_id,
			actor = %member.id,
			role_id = %role.id,
			nodes,
			"role deleted"
		);

		Ok(())
	}
}
