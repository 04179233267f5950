use bitmask_enum::bitmask;

/// Permissions that apply to a single channel, category or voice channel.
///
/// Every kind of channel shares this bit space, a node on a category can
/// therefore grant or deny bits that only matter to its child channels.
#[bitmask(u64)]
pub enum ChannelPermission {
	/// See the channel in the channel list
	View,
	/// Read the messages within the channel
	ViewMessages,
	/// Post messages to the channel
	PostMessages,
	/// Manage the channel's details
	Manage,
	/// Manage permission nodes on the channel
	ManagePermissions,
	/// Post embedded content
	Embed,
	/// Upload files
	AttachContent,
	/// Delete and manage other members' messages
	ManageMessages,
	/// React to messages
	React,
	/// Connect to a voice channel
	Join,
	/// Speak in a voice channel
	Speak,
}

impl Default for ChannelPermission {
	fn default() -> Self {
		Self::none()
	}
}

impl ChannelPermission {
	/// Every bit set, including bits not assigned yet.
	pub fn full_control() -> Self {
		Self::from(u64::MAX)
	}

	/// Returns true if every bit of `other` is set.
	pub fn has_permission(&self, other: Self) -> bool {
		*self & other == other
	}

	/// Forces the allow bits on and the deny bits off.
	///
	/// # Example
	///
	/// base: `0111`, allow: `1000`, deny: `0010`
	/// result: `1101`
	///
	/// ## Calculation
	///
	/// `(0111 & !0010) | 1000 = 0101 | 1000 = 1101`
	pub fn apply(&self, allow: Self, deny: Self) -> Self {
		(*self & !deny) | allow
	}
}

/// Planet wide permissions. These are never overridden per channel.
#[bitmask(u64)]
pub enum PlanetPermission {
	/// View the planet, implicitly granted to every member
	View,
	/// Send invites to the planet
	Invite,
	/// Display the role separately in the member list
	DisplayRole,
	/// Modify base planet settings and the channel tree
	Manage,
	/// Kick members
	Kick,
	/// Ban members
	Ban,
	/// Create channels, the parent category must also allow it
	CreateChannels,
	/// Manage roles and permission nodes
	ManageRoles,
	/// Mention every member at once
	MentionAll,
}

impl Default for PlanetPermission {
	fn default() -> Self {
		Self::none()
	}
}

impl PlanetPermission {
	pub fn full_control() -> Self {
		Self::from(u64::MAX)
	}

	pub fn has_permission(&self, other: Self) -> bool {
		*self & other == other
	}
}

/// Coarse scopes carried by an access token, independent of any planet.
#[bitmask(u64)]
pub enum TokenScope {
	Minimum,
	View,
	Membership,
	Invites,
	PlanetManagement,
	Messages,
	Friends,
	DirectMessages,
}

impl Default for TokenScope {
	fn default() -> Self {
		Self::none()
	}
}

impl TokenScope {
	pub fn full_control() -> Self {
		Self::from(u64::MAX)
	}

	pub fn has_scope(&self, other: Self) -> bool {
		*self & other == other
	}
}

/// The state a permission node assigns to a single bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
	/// The node does not decide this bit, the base value is kept
	Undefined,
	Allow,
	Deny,
}
