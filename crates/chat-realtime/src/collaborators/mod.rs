//! External collaborators the session depends on

pub mod auth;
pub mod identity;

pub use auth::{AuthError, AuthProvider, ChannelAuth, HttpAuthProvider};
pub use identity::{IdentityStore, StaticIdentity};
