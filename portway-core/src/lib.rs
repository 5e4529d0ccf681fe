//! The gateway core: the Config Snapshot (§4.1), Router (§4.2), request
//! context (§3), claims tree (§4.4), error factory/entity writer (§4.7).
//! Everything here is pure domain logic with no I/O — fetching config
//! documents, running authentication/authorization/filters, and talking to
//! the network are all left to the crates above.

pub mod claims;
pub mod context;
pub mod entities;
pub mod entity_writer;
pub mod error;
pub mod router;
pub mod snapshot;
