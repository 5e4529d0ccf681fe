//! Concrete, in-process implementations of the collaborators `portway-auth`
//! and `portway-core` only define the seams for: the token store, the
//! identity resolver, the config document source, and the reload command
//! bus. None of these are part of the hot request path's public contract —
//! a deployment is free to swap any of them out (a Redis-backed
//! [`token_store::InMemoryTokenStore`] replacement, say) without touching
//! the crates above.

pub mod command;
pub mod document_source;
pub mod identity;
pub mod token_store;
