//! KML and KMZ map document rendering.
//!
//! A request names one or more layers over a bounding box. Vector layers turn
//! into folders of placemarks, raster layers (and vector layers pushed over the
//! score threshold) into ground overlays pointing at a secondary image request.
//! KMZ output bundles the document together with the overlay images.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
