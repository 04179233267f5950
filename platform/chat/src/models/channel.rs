use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
	Chat,
	Category,
	Voice,
}

impl ChannelKind {
	pub fn as_i16(self) -> i16 {
		match self {
			Self::Chat => 0,
			Self::Category => 1,
			Self::Voice => 2,
		}
	}

	pub fn from_i16(value: i16) -> Option<Self> {
		match value {
			0 => Some(Self::Chat),
			1 => Some(Self::Category),
			2 => Some(Self::Voice),
			_ => None,
		}
	}
}

impl std::fmt::Display for ChannelKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Chat => write!(f, "chat"),
			Self::Category => write!(f, "category"),
			Self::Voice => write!(f, "voice"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A node of a planet's channel tree.
pub struct Channel {
	/// The unique identifier for the channel.
	pub id: Ulid,
	/// The planet which owns the channel.
	pub planet_id: Ulid,
	/// The category containing this channel, None at the top level.
	pub parent_id: Option<Ulid>,
	/// What kind of channel this is.
	pub kind: ChannelKind,
	/// The name of the channel.
	pub name: String,
	/// When true, a role without a node here is resolved against the parent.
	pub inherits_perms: bool,
	/// The planet's default channel.
	pub is_default: bool,
}

impl Channel {
	pub fn new(planet_id: Ulid, kind: ChannelKind, name: impl Into<String>) -> Self {
		Self {
			id: Ulid::new(),
			planet_id,
			parent_id: None,
			kind,
			name: name.into(),
			inherits_perms: true,
			is_default: false,
		}
	}

	pub fn with_parent(mut self, parent_id: Ulid) -> Self {
		self.parent_id = Some(parent_id);
		self
	}

	pub fn with_inherits_perms(mut self, inherits_perms: bool) -> Self {
		self.inherits_perms = inherits_perms;
		self
	}

	pub fn is_category(&self) -> bool {
		self.kind == ChannelKind::Category
	}
}
