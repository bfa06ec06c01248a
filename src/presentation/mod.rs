//! Output encoders.

pub mod kml;
