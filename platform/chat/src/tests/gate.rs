use std::sync::Arc;

use ulid::Ulid;

use super::fixtures::{app_config, token, Planet};
use crate::gate::{AuthToken, Decision, DenyReason, Gate, GateError};
use crate::messages::{MessageError, PostMessage};
use crate::models::{
	ChannelKind, ChannelPermission, PermissionState, PermissionsNode, PlanetPermission, TokenScope,
};
use crate::permissions::HierarchyError;
use crate::store::{NodeError, NodeStore, PlanetStore};

fn gate(planet: &Planet) -> Arc<Gate> {
	planet.platform(&app_config()).0.gate
}

#[tokio::test]
async fn test_check_reasons() {
	let planet = Planet::chatty();
	let channel = planet.channel("general", None);
	let member = planet.member(&[]);
	let gate = gate(&planet);

	assert_eq!(
		gate.check(member.id, channel.id, ChannelKind::Chat, ChannelPermission::PostMessages)
			.await
			.unwrap(),
		Decision::Granted
	);
	assert_eq!(
		gate.check(Ulid::new(), channel.id, ChannelKind::Chat, ChannelPermission::View)
			.await
			.unwrap(),
		Decision::Denied(DenyReason::NotAMember)
	);
	assert_eq!(
		gate.check(member.id, Ulid::new(), ChannelKind::Chat, ChannelPermission::View)
			.await
			.unwrap(),
		Decision::Denied(DenyReason::TargetNotFound)
	);
	assert_eq!(
		gate.check(member.id, channel.id, ChannelKind::Category, ChannelPermission::View)
			.await
			.unwrap(),
		Decision::Denied(DenyReason::TargetNotFound)
	);
	assert_eq!(
		gate.check(member.id, channel.id, ChannelKind::Chat, ChannelPermission::ManageMessages)
			.await
			.unwrap(),
		Decision::Denied(DenyReason::BitNotGranted)
	);
}

#[tokio::test]
async fn test_every_bit_requires_view() {
	let planet = Planet::chatty();
	let channel = planet.channel("general", None);
	let member = planet.member(&[]);

	planet
		.node(&planet.everyone, &channel, ChannelPermission::none(), ChannelPermission::View)
		.await;

	let decision = gate(&planet)
		.check(member.id, channel.id, ChannelKind::Chat, ChannelPermission::PostMessages)
		.await
		.unwrap();
	assert_eq!(decision, Decision::Denied(DenyReason::BitNotGranted));
}

#[tokio::test]
async fn test_authorize_requires_scope_and_owner() {
	let planet = Planet::chatty();
	let channel = planet.channel("general", None);
	let member = planet.member(&[]);
	let gate = gate(&planet);

	let view_only = AuthToken::new(member.user_id, TokenScope::View);
	assert_eq!(
		gate.authorize(
			&view_only,
			TokenScope::Messages,
			member.id,
			channel.id,
			ChannelKind::Chat,
			ChannelPermission::PostMessages,
		)
		.await
		.unwrap(),
		Decision::Denied(DenyReason::MissingScope)
	);

	let stranger = AuthToken::new(Ulid::new(), TokenScope::full_control());
	assert_eq!(
		gate.authorize(
			&stranger,
			TokenScope::Messages,
			member.id,
			channel.id,
			ChannelKind::Chat,
			ChannelPermission::PostMessages,
		)
		.await
		.unwrap(),
		Decision::Denied(DenyReason::NotAMember)
	);

	assert!(gate
		.authorize(
			&token(&member),
			TokenScope::Messages,
			member.id,
			channel.id,
			ChannelKind::Chat,
			ChannelPermission::PostMessages,
		)
		.await
		.unwrap()
		.is_granted());
}

#[tokio::test]
async fn test_structural_error_denies() {
	let planet = Planet::chatty();
	let a = planet.category("a");
	let b = planet.category("b");
	planet.store.replace_channel(a.clone().with_parent(b.id));
	planet.store.replace_channel(b.clone().with_parent(a.id));
	let channel = planet.channel("general", Some(&a));
	let member = planet.member(&[]);

	let decision = gate(&planet)
		.check(member.id, channel.id, ChannelKind::Chat, ChannelPermission::View)
		.await
		.unwrap();
	assert_eq!(decision, Decision::Denied(DenyReason::Structural));
}

#[tokio::test]
async fn test_check_planet_and_authority() {
	let planet = Planet::chatty();
	let admin = planet.admin_role("admin", 0);
	let moderator = planet.role("mod", 10, ChannelPermission::View);
	let peer = planet.role("peer", 10, ChannelPermission::View);

	let boss = planet.member(&[&admin]);
	let modded = planet.member(&[&moderator]);
	let gate = gate(&planet);

	assert!(gate
		.check_planet(boss.id, PlanetPermission::Ban)
		.await
		.unwrap()
		.is_granted());
	assert_eq!(
		gate.check_planet(modded.id, PlanetPermission::Ban).await.unwrap(),
		Decision::Denied(DenyReason::BitNotGranted)
	);
	assert!(gate
		.check_planet(modded.id, PlanetPermission::View)
		.await
		.unwrap()
		.is_granted());

	assert!(gate
		.check_authority(boss.id, moderator.id)
		.await
		.unwrap()
		.is_granted());
	// Equal positions do not outrank each other.
	assert_eq!(
		gate.check_authority(modded.id, peer.id).await.unwrap(),
		Decision::Denied(DenyReason::LowerAuthority)
	);
	assert_eq!(
		gate.check_authority(modded.id, admin.id).await.unwrap(),
		Decision::Denied(DenyReason::LowerAuthority)
	);
}

#[tokio::test]
async fn test_put_node_invalidates_cache() {
	let planet = Planet::chatty();
	let channel = planet.channel("general", None);
	let manager = planet.manager_role("manager", 1);
	let regular = planet.role("regular", 50, ChannelPermission::View | ChannelPermission::PostMessages);
	let actor = planet.member(&[&manager]);
	let member = planet.member(&[&regular]);

	let (platform, _) = planet.platform(&app_config());
	assert!(platform.resolver.cache().is_some());

	assert!(platform
		.resolver
		.resolve(member.id, channel.id)
		.await
		.unwrap()
		.has_permission(ChannelPermission::PostMessages));

	let node = PermissionsNode::new(planet.id, regular.id, channel.id, channel.kind)
		.with_state(ChannelPermission::PostMessages, PermissionState::Deny);
	platform.gate.put_node(&token(&actor), actor.id, node).await.unwrap();

	assert!(!platform
		.resolver
		.resolve(member.id, channel.id)
		.await
		.unwrap()
		.has_permission(ChannelPermission::PostMessages));

	platform
		.gate
		.delete_node(&token(&actor), actor.id, regular.id, channel.id, channel.kind)
		.await
		.unwrap()
		.expect("node was deleted");

	assert!(platform
		.resolver
		.resolve(member.id, channel.id)
		.await
		.unwrap()
		.has_permission(ChannelPermission::PostMessages));
}

#[tokio::test]
async fn test_put_node_requires_authority_over_role() {
	let planet = Planet::chatty();
	let channel = planet.channel("general", None);
	let manager = planet.manager_role("manager", 5);
	let senior = planet.role("senior", 1, ChannelPermission::View);
	let actor = planet.member(&[&manager]);
	let gate = gate(&planet);

	for role_id in [senior.id, manager.id] {
		let node = PermissionsNode::new(planet.id, role_id, channel.id, channel.kind);
		assert!(matches!(
			gate.put_node(&token(&actor), actor.id, node).await,
			Err(GateError::Denied(DenyReason::LowerAuthority))
		));
	}
}

#[tokio::test]
async fn test_put_node_requires_manage_roles_and_scope() {
	let planet = Planet::chatty();
	let channel = planet.channel("general", None);
	let plain = planet.role("plain", 5, ChannelPermission::full_control());
	let manager = planet.manager_role("manager", 1);
	let actor = planet.member(&[&plain]);
	let manager_member = planet.member(&[&manager]);
	let gate = gate(&planet);

	let node = PermissionsNode::new(planet.id, planet.everyone.id, channel.id, channel.kind);
	assert!(matches!(
		gate.put_node(&token(&actor), actor.id, node.clone()).await,
		Err(GateError::Denied(DenyReason::BitNotGranted))
	));

	let scoped = AuthToken::new(manager_member.user_id, TokenScope::Messages);
	assert!(matches!(
		gate.put_node(&scoped, manager_member.id, node).await,
		Err(GateError::Denied(DenyReason::MissingScope))
	));
}

#[tokio::test]
async fn test_put_node_surfaces_store_rejections() {
	let planet = Planet::chatty();
	let channel = planet.channel("general", None);
	let manager = planet.manager_role("manager", 1);
	let actor = planet.member(&[&manager]);
	let gate = gate(&planet);

	let mut node = PermissionsNode::new(planet.id, planet.everyone.id, channel.id, channel.kind);
	node.allow_mask = ChannelPermission::View;
	node.deny_mask = ChannelPermission::View;

	assert!(matches!(
		gate.put_node(&token(&actor), actor.id, node).await,
		Err(GateError::Node(NodeError::MaskOverlap))
	));
}

#[tokio::test]
async fn test_move_channel() {
	let planet = Planet::chatty();
	let outer = planet.category("outer");
	let inner = planet.category("inner");
	planet.store.replace_channel(inner.clone().with_parent(outer.id));
	let general = planet.channel("general", None);

	let manager = planet.manager_role("manager", 1);
	let actor = planet.member(&[&manager]);
	let gate = gate(&planet);
	let token = token(&actor);

	gate.move_channel(&token, actor.id, general.id, Some(inner.id))
		.await
		.unwrap();
	assert_eq!(
		planet.store.load_channel(general.id).await.unwrap().unwrap().parent_id,
		Some(inner.id)
	);

	assert!(matches!(
		gate.move_channel(&token, actor.id, outer.id, Some(inner.id)).await,
		Err(GateError::Hierarchy(HierarchyError::Cycle(id))) if id == outer.id
	));
	assert!(matches!(
		gate.move_channel(&token, actor.id, outer.id, Some(general.id)).await,
		Err(GateError::Hierarchy(HierarchyError::ParentNotCategory(_)))
	));
	assert!(matches!(
		gate.move_channel(&token, actor.id, general.id, Some(Ulid::new())).await,
		Err(GateError::Denied(DenyReason::TargetNotFound))
	));

	gate.move_channel(&token, actor.id, general.id, None).await.unwrap();
	assert_eq!(
		planet.store.load_channel(general.id).await.unwrap().unwrap().parent_id,
		None
	);
}

#[tokio::test]
async fn test_set_inherits_perms() {
	let planet = Planet::chatty();
	let category = planet.category("text");
	let channel = planet.channel("general", Some(&category));
	let regular = planet.role("regular", 50, ChannelPermission::View | ChannelPermission::PostMessages);
	planet
		.node(&regular, &category, ChannelPermission::none(), ChannelPermission::PostMessages)
		.await;

	let manager = planet.manager_role("manager", 1);
	let actor = planet.member(&[&manager]);
	let member = planet.member(&[&regular]);
	let (platform, _) = planet.platform(&app_config());

	assert!(!platform
		.resolver
		.resolve(member.id, channel.id)
		.await
		.unwrap()
		.has_permission(ChannelPermission::PostMessages));

	platform
		.gate
		.set_inherits_perms(&token(&actor), actor.id, channel.id, false)
		.await
		.unwrap();

	assert!(platform
		.resolver
		.resolve(member.id, channel.id)
		.await
		.unwrap()
		.has_permission(ChannelPermission::PostMessages));
}

#[tokio::test]
async fn test_reorder_roles() {
	let planet = Planet::chatty();
	let manager = planet.manager_role("manager", 1);
	let a = planet.role("a", 10, ChannelPermission::View);
	let b = planet.role("b", 20, ChannelPermission::View);
	let actor = planet.member(&[&manager]);
	let gate = gate(&planet);
	let token = token(&actor);

	gate.reorder_roles(&token, actor.id, &[manager.id, b.id, a.id, planet.everyone.id])
		.await
		.unwrap();

	assert_eq!(planet.store.load_role(b.id).await.unwrap().unwrap().position, 10);
	assert_eq!(planet.store.load_role(a.id).await.unwrap().unwrap().position, 20);
	assert_eq!(planet.store.load_role(manager.id).await.unwrap().unwrap().position, 1);

	assert!(matches!(
		gate.reorder_roles(&token, actor.id, &[manager.id, planet.everyone.id, a.id, b.id])
			.await,
		Err(GateError::InvalidRoleOrder(_))
	));
	assert!(matches!(
		gate.reorder_roles(&token, actor.id, &[manager.id, a.id, planet.everyone.id])
			.await,
		Err(GateError::InvalidRoleOrder(_))
	));
	// Moving a role above the actor is not allowed.
	assert!(matches!(
		gate.reorder_roles(&token, actor.id, &[a.id, manager.id, b.id, planet.everyone.id])
			.await,
		Err(GateError::Denied(DenyReason::LowerAuthority))
	));
}

#[tokio::test]
async fn test_delete_role() {
	let planet = Planet::chatty();
	let channel = planet.channel("general", None);
	let manager = planet.manager_role("manager", 1);
	let doomed = planet.role("doomed", 10, ChannelPermission::View);
	let actor = planet.member(&[&manager]);
	let holder = planet.member(&[&doomed]);
	let gate = gate(&planet);

	planet
		.node(&doomed, &channel, ChannelPermission::PostMessages, ChannelPermission::none())
		.await;

	assert!(matches!(
		gate.delete_role(&token(&actor), actor.id, planet.everyone.id).await,
		Err(GateError::DefaultRole)
	));

	gate.delete_role(&token(&actor), actor.id, doomed.id).await.unwrap();

	assert!(planet.store.load_role(doomed.id).await.unwrap().is_none());
	assert!(planet.store.all_for_planet(planet.id).await.unwrap().is_empty());
	assert!(planet
		.store
		.load_member(holder.id)
		.await
		.unwrap()
		.unwrap()
		.role_ids
		.is_empty());
}

#[tokio::test]
async fn test_delete_channel() {
	let planet = Planet::chatty();
	let category = planet.category("text");
	let general = planet.channel("general", Some(&category));
	let random = planet.channel("random", None);
	let manager = planet.manager_role("manager", 1);
	let plain = planet.role("plain", 5, ChannelPermission::full_control());
	let actor = planet.member(&[&manager]);
	let outsider = planet.member(&[&plain]);
	let (platform, _) = planet.platform(&app_config());
	let gate = platform.gate.clone();

	planet
		.node(&planet.everyone, &general, ChannelPermission::none(), ChannelPermission::React)
		.await;
	planet
		.node(&planet.everyone, &random, ChannelPermission::none(), ChannelPermission::React)
		.await;

	assert!(matches!(
		gate.delete_channel(&token(&outsider), outsider.id, general.id).await,
		Err(GateError::Denied(DenyReason::BitNotGranted))
	));
	assert!(matches!(
		gate.delete_channel(&token(&actor), actor.id, Ulid::new()).await,
		Err(GateError::Denied(DenyReason::TargetNotFound))
	));
	assert!(matches!(
		gate.delete_channel(&token(&actor), actor.id, category.id).await,
		Err(GateError::CategoryNotEmpty(id)) if id == category.id
	));

	let (durable, _) = platform
		.messages
		.post(&token(&actor), actor.id, PostMessage::new(general.id, "flushed"))
		.await
		.unwrap();
	platform.queue.flush().await.unwrap();
	let (staged, _) = platform
		.messages
		.post(&token(&actor), actor.id, PostMessage::new(general.id, "staged"))
		.await
		.unwrap();

	assert!(gate
		.check(actor.id, general.id, ChannelKind::Chat, ChannelPermission::View)
		.await
		.unwrap()
		.is_granted());

	gate.delete_channel(&token(&actor), actor.id, general.id).await.unwrap();

	assert!(planet.store.load_channel(general.id).await.unwrap().is_none());
	assert_eq!(
		planet
			.store
			.all_for_planet(planet.id)
			.await
			.unwrap()
			.into_iter()
			.map(|node| node.target_id)
			.collect::<Vec<_>>(),
		vec![random.id]
	);
	assert!(!planet.store.contains_message(durable));
	assert!(platform.queue.get(staged).is_none());
	assert_eq!(platform.queue.staged_count(), 0);

	assert_eq!(
		gate.check(actor.id, general.id, ChannelKind::Chat, ChannelPermission::View)
			.await
			.unwrap(),
		Decision::Denied(DenyReason::TargetNotFound)
	);

	// The category is empty now.
	gate.delete_channel(&token(&actor), actor.id, category.id).await.unwrap();
	assert!(planet.store.load_channel(category.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_deleted_channel_accepts_no_messages() {
	let planet = Planet::chatty();
	let general = planet.channel("general", None);
	let manager = planet.manager_role("manager", 1);
	let actor = planet.member(&[&manager]);
	let (platform, _) = planet.platform(&app_config());

	platform
		.messages
		.post(&token(&actor), actor.id, PostMessage::new(general.id, "before"))
		.await
		.unwrap();

	platform
		.gate
		.delete_channel(&token(&actor), actor.id, general.id)
		.await
		.unwrap();

	assert!(matches!(
		platform
			.messages
			.post(&token(&actor), actor.id, PostMessage::new(general.id, "after"))
			.await,
		Err(MessageError::Denied(DenyReason::TargetNotFound))
	));

	// A post that was authorized before the delete is still refused.
	let late = planet.new_message(&general, &actor, "late");
	assert!(platform.queue.stage(late).await.is_err());

	assert_eq!(platform.queue.flush().await.unwrap().written, 0);
	assert_eq!(planet.store.message_count(), 0);
}
