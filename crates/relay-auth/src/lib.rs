//! # relay-auth
//!
//! Session token validation for incoming connections.
//!
//! The relay never issues sessions. It looks a token up in the shared
//! session store (Redis in production) and accepts it only while the stored
//! expiry is still in the future.

#![deny(unsafe_code)]

pub mod errors;
pub mod redis_store;
pub mod store;
pub mod validator;

pub use errors::{AuthError, Result};
pub use redis_store::RedisSessionStore;
pub use store::{InMemorySessionStore, SessionRecord, SessionStore};
pub use validator::SessionValidator;
