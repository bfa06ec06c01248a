//! Pagination state and `prev`/`next` network link construction.

use url::form_urlencoded::Serializer;

use crate::domain::document::{LinkRel, NetworkLink};
use crate::domain::types::QualifiedName;

pub const START_INDEX_PARAM: &str = "startindex";
pub const MAX_FEATURES_PARAM: &str = "maxfeatures";

/// Position of one window within a layer's feature sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    start: u64,
    size: Option<u64>,
    has_prev: bool,
    has_next: bool,
}

impl PaginationState {
    /// A filled window counts as "more pages exist", so the last full page
    /// still advertises a `next` link.
    pub fn new(start: u64, size: Option<u64>, window_filled: bool) -> Self {
        Self {
            start,
            size,
            has_prev: start > 0,
            has_next: size.is_some() && window_filled,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn has_prev(&self) -> bool {
        self.has_prev
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn prev_start(&self) -> Option<u64> {
        if !self.has_prev {
            return None;
        }
        let size = self.size?;
        Some(self.start.saturating_sub(size))
    }

    pub fn next_start(&self) -> Option<u64> {
        if !self.has_next {
            return None;
        }
        let size = self.size?;
        Some(self.start.saturating_add(size))
    }
}

/// Builds network links back into the layer's KML endpoint
/// (`<base>rest/<prefix>/<Local>.kml`).
#[derive(Debug, Clone)]
pub struct PaginationLinkBuilder {
    base_url: String,
}

impl PaginationLinkBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
        }
    }

    /// Links for `state`, `prev` first. Unbounded windows get no links.
    /// `preserved` parameters are written ahead of the window parameters.
    pub fn links(
        &self,
        layer: &QualifiedName,
        state: &PaginationState,
        preserved: &[(String, String)],
    ) -> Vec<NetworkLink> {
        let Some(size) = state.size() else {
            return Vec::new();
        };

        let mut links = Vec::with_capacity(2);
        if let Some(start) = state.prev_start() {
            links.push(NetworkLink {
                rel: LinkRel::Prev,
                href: self.href(layer, start, size, preserved),
            });
        }
        if let Some(start) = state.next_start() {
            links.push(NetworkLink {
                rel: LinkRel::Next,
                href: self.href(layer, start, size, preserved),
            });
        }
        links
    }

    fn href(
        &self,
        layer: &QualifiedName,
        start: u64,
        size: u64,
        preserved: &[(String, String)],
    ) -> String {
        let mut serializer = Serializer::new(String::new());
        for (name, value) in preserved {
            serializer.append_pair(name, value);
        }
        serializer.append_pair(START_INDEX_PARAM, &start.to_string());
        serializer.append_pair(MAX_FEATURES_PARAM, &size.to_string());

        let path = match layer.prefix() {
            Some(prefix) => format!("rest/{prefix}/{}.kml", layer.local()),
            None => format!("rest/{}.kml", layer.local()),
        };
        format!("{}{path}?{}", self.base_url, serializer.finish())
    }
}

pub(crate) fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    format!("{trimmed}/")
}
