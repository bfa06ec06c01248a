//! Infrastructure adapters and runtime bootstrap.

pub mod catalog;
pub mod client;
pub mod error;
pub mod geojson;
pub mod overlay;
pub mod remote;
pub mod telemetry;
