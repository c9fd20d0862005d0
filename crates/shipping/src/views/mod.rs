//! Shipping read models and the projections that maintain them.

mod cargo_summary;
mod destination_load;

pub use cargo_summary::{CargoSummary, CargoSummaryProjection};
pub use destination_load::{CargoContribution, DestinationLoad, DestinationLoadProjection};
