use std::collections::HashSet;

use ulid::Ulid;

use crate::models::Channel;
use crate::store::MAX_CHAIN_DEPTH;

/// A violation of the channel tree invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
	#[error("cycle detected at {0}")]
	Cycle(Ulid),
	#[error("ancestor {0} does not exist")]
	MissingAncestor(Ulid),
	#[error("{child} is not a child of {parent}")]
	BrokenLink { child: Ulid, parent: Ulid },
	#[error("{0} belongs to a different planet")]
	CrossPlanet(Ulid),
	#[error("{0} is not a category")]
	ParentNotCategory(Ulid),
	#[error("ancestor chain is deeper than {MAX_CHAIN_DEPTH}")]
	TooDeep,
}

/// Validates an ancestor chain as loaded from the store and cuts it after
/// the first level that does not inherit from its parent.
///
/// The returned chain starts at the target and every element is the parent
/// of the one before it.
pub fn permission_chain(mut chain: Vec<Channel>) -> Result<Vec<Channel>, HierarchyError> {
	let len = walk(&chain, true)?;
	chain.truncate(len);
	Ok(chain)
}

/// Validates the full ancestor chain of a channel, ignoring inheritance.
pub fn validate_chain(chain: &[Channel]) -> Result<(), HierarchyError> {
	walk(chain, false).map(|_| ())
}

/// Returns how many levels of the chain are used.
fn walk(chain: &[Channel], stop_at_opt_out: bool) -> Result<usize, HierarchyError> {
	let Some(target) = chain.first() else {
		return Ok(0);
	};

	let mut seen = HashSet::with_capacity(chain.len());

	for (idx, level) in chain.iter().enumerate() {
		if !seen.insert(level.id) {
			return Err(HierarchyError::Cycle(level.id));
		}

		if level.planet_id != target.planet_id {
			return Err(HierarchyError::CrossPlanet(level.id));
		}

		if idx > 0 {
			let child = &chain[idx - 1];
			if child.parent_id != Some(level.id) {
				return Err(HierarchyError::BrokenLink {
					child: child.id,
					parent: level.id,
				});
			}

			if !level.is_category() {
				return Err(HierarchyError::ParentNotCategory(level.id));
			}
		}

		let Some(parent_id) = level.parent_id else {
			return Ok(idx + 1);
		};

		if stop_at_opt_out && !level.inherits_perms {
			return Ok(idx + 1);
		}

		if idx + 1 == chain.len() {
			if chain.len() >= MAX_CHAIN_DEPTH {
				return Err(HierarchyError::TooDeep);
			}

			return Err(HierarchyError::MissingAncestor(parent_id));
		}
	}

	Ok(chain.len())
}

/// Checks that `channel` may be placed under `parent`.
///
/// `parent_chain` is the ancestor chain of the new parent as loaded from the
/// store.
pub fn validate_move(channel: &Channel, parent: Option<&Channel>, parent_chain: &[Channel]) -> Result<(), HierarchyError> {
	let Some(parent) = parent else {
		return Ok(());
	};

	if parent.planet_id != channel.planet_id {
		return Err(HierarchyError::CrossPlanet(parent.id));
	}

	if !parent.is_category() {
		return Err(HierarchyError::ParentNotCategory(parent.id));
	}

	if parent.id == channel.id || parent_chain.iter().any(|c| c.id == channel.id) {
		return Err(HierarchyError::Cycle(channel.id));
	}

	validate_chain(parent_chain)
}
