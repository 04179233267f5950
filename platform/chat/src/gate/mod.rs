use std::sync::Arc;

use ulid::Ulid;

use crate::models::{ChannelKind, ChannelPermission, Member, PlanetPermission, TokenScope};
use crate::permissions::{authority, planet_permissions, HierarchyError, PermissionResolver, ResolveError};
use crate::staging::StagingQueue;
use crate::store::{NodeError, NodeStore, PlanetStore, StoreError};

mod manage;

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
	/// The actor is not a member of the planet, or the token does not belong
	/// to the member.
	NotAMember,
	/// The target does not exist, is of another kind or lives in another
	/// planet.
	TargetNotFound,
	/// The resolved permissions do not contain the requested bit.
	BitNotGranted,
	/// The actor does not outrank the role being edited.
	LowerAuthority,
	/// The token lacks a required scope.
	MissingScope,
	/// The channel tree is corrupt, always fails closed.
	Structural,
}

impl std::fmt::Display for DenyReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::NotAMember => write!(f, "not a member"),
			Self::TargetNotFound => write!(f, "target not found"),
			Self::BitNotGranted => write!(f, "permission not granted"),
			Self::LowerAuthority => write!(f, "insufficient authority"),
			Self::MissingScope => write!(f, "missing token scope"),
			Self::Structural => write!(f, "structural error"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	Granted,
	Denied(DenyReason),
}

impl Decision {
	pub fn is_granted(&self) -> bool {
		matches!(self, Self::Granted)
	}

	pub fn into_result(self) -> Result<(), GateError> {
		match self {
			Self::Granted => Ok(()),
			Self::Denied(reason) => Err(GateError::Denied(reason)),
		}
	}
}

/// The authenticated caller as supplied by the token layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthToken {
	pub user_id: Ulid,
	pub scopes: TokenScope,
}

impl AuthToken {
	pub fn new(user_id: Ulid, scopes: TokenScope) -> Self {
		Self { user_id, scopes }
	}
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
	#[error("denied: {0}")]
	Denied(DenyReason),
	#[error("invalid node: {0}")]
	Node(#[from] NodeError),
	#[error("invalid hierarchy: {0}")]
	Hierarchy(#[from] HierarchyError),
	#[error("invalid role order: {0}")]
	InvalidRoleOrder(String),
	#[error("the default role cannot be deleted")]
	DefaultRole,
	#[error("category {0} still has channels")]
	CategoryNotEmpty(Ulid),
	#[error(transparent)]
	Store(#[from] StoreError),
}

impl From<DenyReason> for GateError {
	fn from(reason: DenyReason) -> Self {
		Self::Denied(reason)
	}
}

/// The single choke point every read and write passes through.
///
/// Expected denials are returned as [`Decision::Denied`], only store failures
/// are errors.
pub struct Gate {
	resolver: Arc<PermissionResolver>,
	planets: Arc<dyn PlanetStore>,
	nodes: Arc<dyn NodeStore>,
	queue: Arc<StagingQueue>,
}

impl Gate {
	pub fn new(
		resolver: Arc<PermissionResolver>,
		planets: Arc<dyn PlanetStore>,
		nodes: Arc<dyn NodeStore>,
		queue: Arc<StagingQueue>,
	) -> Self {
		Self {
			resolver,
			planets,
			nodes,
			queue,
		}
	}

	pub fn resolver(&self) -> &PermissionResolver {
		&self.resolver
	}

	pub async fn check(
		&self,
		actor_member_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
		permission: ChannelPermission,
	) -> Result<Decision, StoreError> {
		let Some(member) = self.planets.load_member(actor_member_id).await? else {
			return Ok(Decision::Denied(DenyReason::NotAMember));
		};

		self.check_member(&member, target_id, target_type, permission).await
	}

	/// Like [`Gate::check`] but also requires `scope` on the token and the
	/// token's user to own the member.
	pub async fn authorize(
		&self,
		token: &AuthToken,
		scope: TokenScope,
		actor_member_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
		permission: ChannelPermission,
	) -> Result<Decision, StoreError> {
		match self
			.authorize_member(token, scope, actor_member_id, target_id, target_type, permission)
			.await?
		{
			Ok(_) => Ok(Decision::Granted),
			Err(reason) => Ok(Decision::Denied(reason)),
		}
	}

	/// Like [`Gate::authorize`] but hands back the member on success.
	pub async fn authorize_member(
		&self,
		token: &AuthToken,
		scope: TokenScope,
		actor_member_id: Ulid,
		target_id: Ulid,
		target_type: ChannelKind,
		permission: ChannelPermission,
	) -> Result<Result<Member, DenyReason>, StoreError> {
		let member = match self.token_member(token, scope, actor_member_id).await? {
			Ok(member) => member,
			Err(reason) => return Ok(Err(reason)),
		};

		match self.check_member(&member, target_id, target_type, permission).await? {
			Decision::Granted => Ok(Ok(member)),
			Decision::Denied(reason) => Ok(Err(reason)),
		}
	}

	pub async fn check_member(
		&self,
		member: &Member,
		target_id: Ulid,
		target_type: ChannelKind,
		permission: ChannelPermission,
	) -> Result<Decision, StoreError> {
		match self.planets.load_channel(target_id).await? {
			Some(target) if target.planet_id == member.planet_id && target.kind == target_type => {}
			_ => return Ok(Decision::Denied(DenyReason::TargetNotFound)),
		}

		let resolved = match self.resolver.resolve_for(member, target_id).await {
			Ok(resolved) => resolved,
			Err(err) => return deny_for(err),
		};

		// Nothing else in a channel is usable without seeing it.
		let required = permission | ChannelPermission::View;

		if resolved.has_permission(required) {
			Ok(Decision::Granted)
		} else {
			Ok(Decision::Denied(DenyReason::BitNotGranted))
		}
	}

	pub async fn check_planet(&self, actor_member_id: Ulid, permission: PlanetPermission) -> Result<Decision, StoreError> {
		let Some(member) = self.planets.load_member(actor_member_id).await? else {
			return Ok(Decision::Denied(DenyReason::NotAMember));
		};

		self.check_planet_member(&member, permission).await
	}

	pub async fn check_planet_member(&self, member: &Member, permission: PlanetPermission) -> Result<Decision, StoreError> {
		let roles = self.planets.load_roles_for_member(member).await?;

		if planet_permissions(&roles).has_permission(permission) {
			Ok(Decision::Granted)
		} else {
			Ok(Decision::Denied(DenyReason::BitNotGranted))
		}
	}

	/// Granted only if the actor strictly outranks the role.
	pub async fn check_authority(&self, actor_member_id: Ulid, role_id: Ulid) -> Result<Decision, StoreError> {
		let Some(member) = self.planets.load_member(actor_member_id).await? else {
			return Ok(Decision::Denied(DenyReason::NotAMember));
		};

		self.check_authority_member(&member, role_id).await
	}

	pub async fn check_authority_member(&self, member: &Member, role_id: Ulid) -> Result<Decision, StoreError> {
		let role = match self.planets.load_role(role_id).await? {
			Some(role) if role.planet_id == member.planet_id => role,
			_ => return Ok(Decision::Denied(DenyReason::TargetNotFound)),
		};

		let roles = self.planets.load_roles_for_member(member).await?;

		if authority(&roles) < role.position {
			Ok(Decision::Granted)
		} else {
			Ok(Decision::Denied(DenyReason::LowerAuthority))
		}
	}

	async fn token_member(
		&self,
		token: &AuthToken,
		scope: TokenScope,
		actor_member_id: Ulid,
	) -> Result<Result<Member, DenyReason>, StoreError> {
		if !token.scopes.has_scope(scope) {
			return Ok(Err(DenyReason::MissingScope));
		}

		match self.planets.load_member(actor_member_id).await? {
			Some(member) if member.user_id == token.user_id => Ok(Ok(member)),
			_ => Ok(Err(DenyReason::NotAMember)),
		}
	}
}

fn deny_for(err: ResolveError) -> Result<Decision, StoreError> {
	match err {
		ResolveError::NotAMember => Ok(Decision::Denied(DenyReason::NotAMember)),
		ResolveError::TargetNotFound => Ok(Decision::Denied(DenyReason::TargetNotFound)),
		ResolveError::Structural(_) => Ok(Decision::Denied(DenyReason::Structural)),
		ResolveError::Store(err) => Err(err),
	}
}
