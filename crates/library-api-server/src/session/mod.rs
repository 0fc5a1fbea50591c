//! Cookie-backed session registry.

pub mod store;

pub use store::{Session, SessionId, SessionStore};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";
