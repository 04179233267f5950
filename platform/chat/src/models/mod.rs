mod channel;
mod member;
mod message;
mod node;
mod permission;
mod role;

pub use channel::*;
pub use member::*;
pub use message::*;
pub use node::*;
pub use permission::*;
pub use role::*;
