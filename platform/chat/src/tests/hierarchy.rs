use ulid::Ulid;

use crate::models::{Channel, ChannelKind};
use crate::permissions::hierarchy::{permission_chain, validate_chain, validate_move};
use crate::permissions::HierarchyError;

fn category(planet_id: Ulid, parent: Option<&Channel>) -> Channel {
	let channel = Channel::new(planet_id, ChannelKind::Category, "category");
	match parent {
		Some(parent) => channel.with_parent(parent.id),
		None => channel,
	}
}

#[test]
fn test_chain_is_cut_at_opt_out() {
	let planet_id = Ulid::new();
	let root = category(planet_id, None);
	let middle = category(planet_id, Some(&root)).with_inherits_perms(false);
	let channel = Channel::new(planet_id, ChannelKind::Chat, "general").with_parent(middle.id);

	let chain = permission_chain(vec![channel.clone(), middle.clone(), root]).unwrap();
	assert_eq!(chain.iter().map(|c| c.id).collect::<Vec<_>>(), vec![channel.id, middle.id]);
}

#[test]
fn test_empty_chain() {
	assert!(permission_chain(Vec::new()).unwrap().is_empty());
}

#[test]
fn test_broken_link() {
	let planet_id = Ulid::new();
	let root = category(planet_id, None);
	let other = category(planet_id, None);
	let channel = Channel::new(planet_id, ChannelKind::Chat, "general").with_parent(root.id);

	assert_eq!(
		permission_chain(vec![channel.clone(), other.clone()]),
		Err(HierarchyError::BrokenLink {
			child: channel.id,
			parent: other.id,
		})
	);
}

#[test]
fn test_parent_must_be_a_category() {
	let planet_id = Ulid::new();
	let parent = Channel::new(planet_id, ChannelKind::Voice, "voice");
	let channel = Channel::new(planet_id, ChannelKind::Chat, "general").with_parent(parent.id);

	assert_eq!(
		validate_chain(&[channel, parent.clone()]),
		Err(HierarchyError::ParentNotCategory(parent.id))
	);
}

#[test]
fn test_cross_planet_ancestor() {
	let root = category(Ulid::new(), None);
	let channel = Channel::new(Ulid::new(), ChannelKind::Chat, "general").with_parent(root.id);

	assert_eq!(
		permission_chain(vec![channel, root.clone()]),
		Err(HierarchyError::CrossPlanet(root.id))
	);
}

#[test]
fn test_move_under_own_descendant_is_a_cycle() {
	let planet_id = Ulid::new();
	let outer = category(planet_id, None);
	let inner = category(planet_id, Some(&outer));

	assert_eq!(
		validate_move(&outer, Some(&inner), &[inner.clone(), outer.clone()]),
		Err(HierarchyError::Cycle(outer.id))
	);
	assert_eq!(
		validate_move(&outer, Some(&outer), &[outer.clone()]),
		Err(HierarchyError::Cycle(outer.id))
	);
}

#[test]
fn test_move_checks_parent() {
	let planet_id = Ulid::new();
	let channel = Channel::new(planet_id, ChannelKind::Chat, "general");
	let chat = Channel::new(planet_id, ChannelKind::Chat, "other");
	let foreign = category(Ulid::new(), None);
	let target = category(planet_id, None);

	assert_eq!(
		validate_move(&channel, Some(&chat), &[chat.clone()]),
		Err(HierarchyError::ParentNotCategory(chat.id))
	);
	assert_eq!(
		validate_move(&channel, Some(&foreign), &[foreign.clone()]),
		Err(HierarchyError::CrossPlanet(foreign.id))
	);
	assert_eq!(validate_move(&channel, Some(&target), &[target.clone()]), Ok(()));
	assert_eq!(validate_move(&channel, None, &[]), Ok(()));
}
