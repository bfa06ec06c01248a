//! Rendering pipeline: layer planning, folder assembly, composition and packaging.

pub mod archive;
pub mod compose;
pub mod cursor;
pub mod error;
pub mod folder;
pub mod format_options;
pub mod overlay;
pub mod pagination;
pub mod repos;
pub mod service;
pub mod templates;
