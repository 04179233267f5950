use ulid::Ulid;

use super::{ChannelKind, ChannelPermission, PermissionState};

/// Identifies the single node a role may have on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
	pub role_id: Ulid,
	pub target_id: Ulid,
	pub target_type: ChannelKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A per role override attached to a channel or category.
///
/// A bit set in `allow_mask` is forced on, a bit set in `deny_mask` is forced
/// off, a bit in neither keeps the role's base value. A bit is never set in
/// both masks.
pub struct PermissionsNode {
	/// The unique identifier for the node.
	pub id: Ulid,
	/// The planet the node belongs to.
	pub planet_id: Ulid,
	/// The role this node applies to.
	pub role_id: Ulid,
	/// The channel or category this node is attached to.
	pub target_id: Ulid,
	/// The kind of the target.
	pub target_type: ChannelKind,
	/// Bits forced on.
	pub allow_mask: ChannelPermission,
	/// Bits forced off.
	pub deny_mask: ChannelPermission,
}

impl PermissionsNode {
	pub fn new(planet_id: Ulid, role_id: Ulid, target_id: Ulid, target_type: ChannelKind) -> Self {
		Self {
			id: Ulid::new(),
			planet_id,
			role_id,
			target_id,
			target_type,
			allow_mask: ChannelPermission::none(),
			deny_mask: ChannelPermission::none(),
		}
	}

	pub fn key(&self) -> NodeKey {
		NodeKey {
			role_id: self.role_id,
			target_id: self.target_id,
			target_type: self.target_type,
		}
	}

	/// Returns false if a bit is both allowed and denied.
	pub fn is_consistent(&self) -> bool {
		(self.allow_mask & self.deny_mask).bits() == 0
	}

	pub fn state_of(&self, permission: ChannelPermission) -> PermissionState {
		if self.deny_mask & permission == permission {
			PermissionState::Deny
		} else if self.allow_mask & permission == permission {
			PermissionState::Allow
		} else {
			PermissionState::Undefined
		}
	}

	/// Sets the state of the given bits, keeping both masks disjoint.
	pub fn set_state(&mut self, permission: ChannelPermission, state: PermissionState) {
		self.allow_mask &= !permission;
		self.deny_mask &= !permission;

		match state {
			PermissionState::Allow => self.allow_mask |= permission,
			PermissionState::Deny => self.deny_mask |= permission,
			PermissionState::Undefined => {}
		}
	}

	pub fn with_state(mut self, permission: ChannelPermission, state: PermissionState) -> Self {
		self.set_state(permission, state);
		self
	}

	/// Applies this node on top of the base permissions.
	pub fn apply(&self, base: ChannelPermission) -> ChannelPermission {
		base.apply(self.allow_mask, self.deny_mask)
	}
}
