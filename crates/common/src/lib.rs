//! Identifier types shared by every layer of the engine.

mod types;

pub use types::{AggregateId, Issuer, ParseAggregateIdError};
