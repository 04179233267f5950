use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A user's membership in a planet.
/// The planet's default role is always held, whether listed here or not.
pub struct Member {
	/// The unique identifier for the member.
	pub id: Ulid,
	/// The planet the membership is for.
	pub planet_id: Ulid,
	/// The user holding the membership.
	pub user_id: Ulid,
	/// Roles assigned to the member, in assignment order.
	pub role_ids: Vec<Ulid>,
}

impl Member {
	pub fn new(planet_id: Ulid, user_id: Ulid) -> Self {
		Self {
			id: Ulid::new(),
			planet_id,
			user_id,
			role_ids: Vec::new(),
		}
	}

	pub fn with_role(mut self, role_id: Ulid) -> Self {
		if !self.role_ids.contains(&role_id) {
			self.role_ids.push(role_id);
		}
		self
	}
}
