//! Citypack: building-index and commuter-demand generation for custom
//! transit-sim cities, plus the HTTP server that delivers the results.

pub mod cli;
pub mod commands;
pub mod demand;
pub mod geometry;
pub mod index;
pub mod io;
pub mod server;
pub mod stream;
pub mod validate;

#[doc(inline)]
pub use index::{BuildingIndex, BuildingRecord, GridIndexer, IndexStats};

#[doc(inline)]
pub use demand::{CommuterPop, DemandData, DemandParams, DemandPoint};
