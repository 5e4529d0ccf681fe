//! The Filter Engine (§4.5): collection, grouping, sorting, and the
//! cursor-based execution model, plus a couple of illustrative built-in
//! filters exercising the contract end-to-end.

pub mod builtin;
pub mod collect;
pub mod engine;
pub mod filter;

pub use collect::{collect_filter_chain, FilterRegistry};
pub use engine::{run, FilterCtx, FilterSlot};
pub use filter::Filter;
