//! `AuthnRequest` session tracking for `InResponseTo` correlation and replay
//! prevention.

pub mod store;
pub mod types;

pub use store::{InMemoryRequestSessionStore, RequestSessionStore};
pub use types::{RequestSession, SessionError, CLOCK_SKEW_GRACE_SECONDS, DEFAULT_SESSION_TTL_SECONDS};
