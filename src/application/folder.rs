//! Per-layer planning and folder assembly.
//!
//! Planning resolves the catalog entry and style for a requested layer and
//! decides, from the layer kind and the score, whether it is sent as
//! placemarks or as a ground overlay. Assembly then turns a plan into the
//! layer's [`Folder`].

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::application::cursor::FeatureCursor;
use crate::application::error::MapError;
use crate::application::format_options::FormatOptions;
use crate::application::overlay::OverlayLayer;
use crate::application::pagination::PaginationLinkBuilder;
use crate::application::repos::{
    FeatureQuery, FeatureSource, FeatureStream, LayerCatalog, RepoError, StyleResolver,
};
use crate::application::templates::PlacemarkTemplates;
use crate::domain::document::{Folder, GroundOverlay, Placemark};
use crate::domain::entities::{LayerInfo, LayerSource, Style};
use crate::domain::request::{LayerRequest, RenderRequest};
use crate::domain::types::LayerKind;

const METRIC_PLACEMARKS: &str = "kmlmap_placemarks_total";
const METRIC_OVERLAYS: &str = "kmlmap_overlays_total";
const METRIC_FALLBACKS: &str = "kmlmap_layer_fallbacks_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Placemarks,
    Overlay,
}

/// Resolved layer, style and render mode for one requested layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPlan {
    pub index: usize,
    pub layer: LayerInfo,
    /// Style name sent with secondary image requests.
    pub style_name: String,
    pub style: Option<Style>,
    pub mode: RenderMode,
}

impl LayerPlan {
    pub fn is_overlay(&self) -> bool {
        self.mode == RenderMode::Overlay
    }

    pub fn overlay_layer(&self) -> OverlayLayer {
        OverlayLayer {
            name: self.layer.name.clone(),
            style: self.style_name.clone(),
            source: self.layer.source.clone(),
        }
    }
}

#[derive(Clone)]
pub struct LayerFolderAssembler {
    catalog: Arc<dyn LayerCatalog>,
    features: Arc<dyn FeatureSource>,
    styles: Arc<dyn StyleResolver>,
    remote_features: Option<Arc<dyn FeatureSource>>,
    links: PaginationLinkBuilder,
    max_features: Option<u64>,
}

impl LayerFolderAssembler {
    pub fn new(
        catalog: Arc<dyn LayerCatalog>,
        features: Arc<dyn FeatureSource>,
        styles: Arc<dyn StyleResolver>,
        links: PaginationLinkBuilder,
    ) -> Self {
        Self {
            catalog,
            features,
            styles,
            remote_features: None,
            links,
            max_features: None,
        }
    }

    /// Source used for layers served by a remote WFS.
    pub fn with_remote_features(mut self, remote: Arc<dyn FeatureSource>) -> Self {
        self.remote_features = Some(remote);
        self
    }

    /// Server side cap on placemarks per layer, applied on top of `maxfeatures`.
    pub fn with_max_features(mut self, max_features: Option<u64>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Resolve every requested layer before any output is produced, so an
    /// unknown layer fails the request up front.
    pub fn plan_all(
        &self,
        request: &RenderRequest,
        options: &FormatOptions,
    ) -> Result<Vec<LayerPlan>, MapError> {
        request
            .layers
            .iter()
            .enumerate()
            .map(|(index, layer)| self.plan(request, index, layer, options))
            .collect()
    }

    pub fn plan(
        &self,
        request: &RenderRequest,
        index: usize,
        requested: &LayerRequest,
        options: &FormatOptions,
    ) -> Result<LayerPlan, MapError> {
        let layer = match self
            .catalog
            .find_layer(&requested.name)
            .map_err(MapError::Catalog)?
        {
            Some(layer) => layer,
            None => match &request.remote {
                Some(remote) => LayerInfo::remote(requested.name.clone(), remote.clone()),
                None => {
                    return Err(MapError::LayerNotFound {
                        layer: requested.name.to_string(),
                    });
                }
            },
        };

        let (style_name, style) = self.resolve_style(&layer, requested.style.as_deref())?;
        let mode = self.render_mode(request, &layer, options);
        debug!(
            target = "application::folder::LayerFolderAssembler",
            layer = %layer.name,
            kind = layer.kind.as_str(),
            style = %style_name,
            score = options.score.get(),
            overlay = mode == RenderMode::Overlay,
            "planned layer"
        );

        Ok(LayerPlan {
            index,
            layer,
            style_name,
            style,
            mode,
        })
    }

    fn resolve_style(
        &self,
        layer: &LayerInfo,
        requested: Option<&str>,
    ) -> Result<(String, Option<Style>), MapError> {
        if let Some(name) = requested.filter(|name| *name != layer.default_style) {
            match self.styles.find_style(name) {
                Ok(Some(style)) => return Ok((name.to_string(), Some(style))),
                Ok(None) => {}
                Err(RepoError::NotFound) => {}
                Err(err) => return Err(MapError::Catalog(err)),
            }
            let err = MapError::StyleResolution {
                layer: layer.name.to_string(),
                style: name.to_string(),
            };
            warn!(
                target = "application::folder::LayerFolderAssembler",
                error = %err,
                fallback = %layer.default_style,
                "falling back to the layer default style"
            );
            counter!(METRIC_FALLBACKS, "reason" => "style").increment(1);
        }

        if layer.default_style.is_empty() {
            return Ok((String::new(), None));
        }
        let style = match self.styles.find_style(&layer.default_style) {
            Ok(found) => found,
            Err(RepoError::NotFound) => None,
            Err(err) => return Err(MapError::Catalog(err)),
        }
        .unwrap_or_else(|| Style::named(layer.default_style.clone()));
        Ok((layer.default_style.clone(), Some(style)))
    }

    fn render_mode(
        &self,
        request: &RenderRequest,
        layer: &LayerInfo,
        options: &FormatOptions,
    ) -> RenderMode {
        if layer.kind == LayerKind::Raster || options.score.forces_overlay() {
            return RenderMode::Overlay;
        }
        if let LayerSource::Remote(_) = layer.source {
            return RenderMode::Placemarks;
        }

        let query = FeatureQuery {
            layer,
            feature_ids: &request.feature_ids,
            filter: request.filter.as_deref(),
            bbox: request.bbox,
        };
        match self.features.count(&query) {
            Ok(count) if options.score.prefers_vector(count) => RenderMode::Placemarks,
            Ok(count) => {
                debug!(
                    target = "application::folder::LayerFolderAssembler",
                    layer = %layer.name,
                    count,
                    "feature count above score threshold, sending an overlay"
                );
                RenderMode::Overlay
            }
            Err(err) => {
                warn!(
                    target = "application::folder::LayerFolderAssembler",
                    layer = %layer.name,
                    error = %err,
                    "feature count unavailable, sending placemarks"
                );
                RenderMode::Placemarks
            }
        }
    }

    /// Build the folder for `plan`. Overlay plans point at `overlay_href`.
    pub fn assemble(
        &self,
        request: &RenderRequest,
        plan: &LayerPlan,
        options: &FormatOptions,
        overlay_href: &str,
    ) -> Result<Folder, MapError> {
        match plan.mode {
            RenderMode::Overlay => Ok(self.assemble_overlay(request, plan, overlay_href)),
            RenderMode::Placemarks => self.assemble_placemarks(request, plan, options),
        }
    }

    fn assemble_overlay(&self, request: &RenderRequest, plan: &LayerPlan, href: &str) -> Folder {
        let mut folder = Folder::new(plan.layer.name.to_string());
        folder.push_overlay(GroundOverlay {
            name: plan.layer.name.to_string(),
            href: href.to_string(),
            bbox: request.bbox,
            draw_order: u32::try_from(plan.index).unwrap_or(u32::MAX),
        });
        counter!(METRIC_OVERLAYS).increment(1);
        folder
    }

    fn assemble_placemarks(
        &self,
        request: &RenderRequest,
        plan: &LayerPlan,
        options: &FormatOptions,
    ) -> Result<Folder, MapError> {
        let layer = &plan.layer;
        let mut folder = Folder::new(layer.name.to_string());
        if let Some(style) = &plan.style {
            folder = folder.with_style(style.clone());
        }

        let stream = self.feature_stream(request, layer)?;
        let max = match (request.max_features, self.max_features) {
            (Some(requested), Some(cap)) => Some(requested.min(cap)),
            (requested, cap) => requested.or(cap),
        };
        let mut cursor = FeatureCursor::new(stream, request.start_index, max);

        let templates =
            PlacemarkTemplates::new(&layer.name, &layer.templates, options.include_attributes);
        let style_url = plan.style.as_ref().map(|style| format!("#{}", style.name));
        for feature in cursor.by_ref() {
            folder.push_placemark(Placemark {
                name: templates.title(&feature),
                description: templates.description(&feature),
                time: templates.time(&feature),
                style_url: style_url.clone(),
                extended_data: templates.extended_data(&feature),
                id: feature.id,
                geometry: feature.geometry,
            });
        }
        counter!(METRIC_PLACEMARKS).increment(cursor.yielded());

        if options.relative_links {
            let state = cursor.pagination();
            let preserved: Vec<(String, String)> = request
                .filter
                .iter()
                .map(|filter| ("cql_filter".to_string(), filter.clone()))
                .chain(request.passthrough.iter().cloned())
                .collect();
            folder.push_links(self.links.links(&layer.name, &state, &preserved));
        }
        Ok(folder)
    }

    fn feature_stream(
        &self,
        request: &RenderRequest,
        layer: &LayerInfo,
    ) -> Result<FeatureStream, MapError> {
        let query = FeatureQuery {
            layer,
            feature_ids: &request.feature_ids,
            filter: request.filter.as_deref(),
            bbox: request.bbox,
        };
        match &layer.source {
            LayerSource::Local => {
                self.features
                    .features(&query)
                    .map_err(|source| MapError::Features {
                        layer: layer.name.to_string(),
                        source,
                    })
            }
            LayerSource::Remote(remote) => {
                let result = match &self.remote_features {
                    Some(source) => source.features(&query),
                    None => Err(RepoError::unavailable(
                        remote.url.clone(),
                        "no remote feature source configured",
                    )),
                };
                result.or_else(|source| {
                    let err = MapError::RemoteSourceUnavailable {
                        layer: layer.name.to_string(),
                        url: remote.url.clone(),
                        source,
                    };
                    warn!(
                        target = "application::folder::LayerFolderAssembler",
                        error = %err,
                        "remote layer unavailable, sending no features"
                    );
                    counter!(METRIC_FALLBACKS, "reason" => "remote").increment(1);
                    Ok(Box::new(std::iter::empty()) as FeatureStream)
                })
            }
        }
    }
}
