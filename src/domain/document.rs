//! In-memory KML document tree produced by the pipeline.

use geo_types::Geometry;

use crate::domain::entities::Style;
use crate::domain::types::BoundingBox;

/// Time primitive attached to a placemark, already encoded as ISO-8601 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimePrimitive {
    Stamp(String),
    Span {
        begin: Option<String>,
        end: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placemark {
    pub id: String,
    pub name: String,
    /// Pre-rendered HTML, written as CDATA.
    pub description: Option<String>,
    pub time: Option<TimePrimitive>,
    pub style_url: Option<String>,
    pub extended_data: Vec<(String, String)>,
    pub geometry: Geometry<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroundOverlay {
    pub name: String,
    pub href: String,
    pub bbox: BoundingBox,
    pub draw_order: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRel {
    Prev,
    Next,
}

impl LinkRel {
    pub fn id(self) -> &'static str {
        match self {
            LinkRel::Prev => "prev",
            LinkRel::Next => "next",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            LinkRel::Prev => "Previous page",
            LinkRel::Next => "Next page",
        }
    }
}

/// Pagination link to the previous or next window of a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLink {
    pub rel: LinkRel,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FolderChild {
    Placemark(Placemark),
    GroundOverlay(GroundOverlay),
    NetworkLink(NetworkLink),
}

/// Group of entries for one requested layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    name: String,
    style: Option<Style>,
    children: Vec<FolderChild>,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            style: None,
            children: Vec::new(),
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn style(&self) -> Option<&Style> {
        self.style.as_ref()
    }

    pub fn children(&self) -> &[FolderChild] {
        &self.children
    }

    pub fn push_placemark(&mut self, placemark: Placemark) {
        self.children.push(FolderChild::Placemark(placemark));
    }

    pub fn push_overlay(&mut self, overlay: GroundOverlay) {
        self.children.push(FolderChild::GroundOverlay(overlay));
    }

    /// Append pagination links; `prev` always lands before `next`.
    pub fn push_links(&mut self, mut links: Vec<NetworkLink>) {
        links.sort_by_key(|link| match link.rel {
            LinkRel::Prev => 0,
            LinkRel::Next => 1,
        });
        self.children
            .extend(links.into_iter().map(FolderChild::NetworkLink));
    }

    pub fn placemarks(&self) -> impl Iterator<Item = &Placemark> {
        self.children.iter().filter_map(|child| match child {
            FolderChild::Placemark(placemark) => Some(placemark),
            _ => None,
        })
    }

    pub fn overlays(&self) -> impl Iterator<Item = &GroundOverlay> {
        self.children.iter().filter_map(|child| match child {
            FolderChild::GroundOverlay(overlay) => Some(overlay),
            _ => None,
        })
    }

    pub fn links(&self) -> impl Iterator<Item = &NetworkLink> {
        self.children.iter().filter_map(|child| match child {
            FolderChild::NetworkLink(link) => Some(link),
            _ => None,
        })
    }
}

/// Root of a KML response. The title, when present, is written before any folder.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    title: Option<String>,
    folders: Vec<Folder>,
}

impl Document {
    pub fn new(title: Option<String>, folders: Vec<Folder>) -> Self {
        Self { title, folders }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }
}
