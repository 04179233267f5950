use ulid::Ulid;

use super::{ChannelPermission, PlanetPermission};

#[derive(Debug, Clone, PartialEq, Eq)]
/// A named permission template inside a planet.
/// Roles are ordered by position, a lower position means more authority.
pub struct Role {
	/// The unique identifier for the role.
	pub id: Ulid,
	/// The planet this role belongs to.
	pub planet_id: Ulid,
	/// The name of the role.
	pub name: String,
	/// The order of the role. (lower position = more authority) The default
	/// role always has the greatest position in its planet.
	pub position: u32,
	/// The channel permissions granted when no node decides otherwise.
	pub base_permissions: ChannelPermission,
	/// The planet wide permissions granted by this role.
	pub planet_permissions: PlanetPermission,
	/// Admin roles are granted every planet permission.
	pub is_admin: bool,
	/// The role every member implicitly holds.
	pub is_default: bool,
}

impl Role {
	pub fn new(planet_id: Ulid, name: impl Into<String>, position: u32) -> Self {
		Self {
			id: Ulid::new(),
			planet_id,
			name: name.into(),
			position,
			base_permissions: ChannelPermission::none(),
			planet_permissions: PlanetPermission::none(),
			is_admin: false,
			is_default: false,
		}
	}
}

/// The role with the lowest position. Equal positions are broken by id so
/// the result never depends on the order roles were loaded in.
pub fn highest_authority<'a>(roles: impl IntoIterator<Item = &'a Role>) -> Option<&'a Role> {
	roles.into_iter().min_by_key(|role| (role.position, role.id))
}
