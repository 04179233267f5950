mod cache;
pub mod hierarchy;
mod resolver;

pub use cache::PermissionCache;
pub use hierarchy::HierarchyError;
pub use resolver::{authority, effective_permissions, planet_permissions, PermissionResolver, ResolveError};
