//! Business rules that sit between the web layer and storage: account signup and
//! login, credential tokens, and the database backed message store the relay
//! writes through.
//!
//! Consumers of `domain` do not need to depend on `entity_api` directly; the
//! entity modules they need are re-exported here.

// Re-exports from `entity` crate via `entity_api`
pub use entity_api::{channels, jwts, messages, users, Id};

pub mod error;
pub mod message_store;
pub mod token;
pub mod user;
