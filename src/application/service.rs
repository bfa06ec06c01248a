//! Map rendering service: request in, KML document or KMZ archive out.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::{debug, info};

use crate::application::archive::{ArchivePackager, image_entry};
use crate::application::compose::DocumentComposer;
use crate::application::error::MapError;
use crate::application::folder::{LayerFolderAssembler, LayerPlan};
use crate::application::format_options::{FormatDefaults, FormatOptions};
use crate::application::overlay::{OverlayLayer, OverlayUrlBuilder};
use crate::application::pagination::PaginationLinkBuilder;
use crate::application::repos::{FeatureSource, LayerCatalog, OverlayRenderer, StyleResolver};
use crate::domain::document::Document;
use crate::domain::request::RenderRequest;
use crate::domain::types::QualifiedName;
use crate::presentation::kml::encode_document;

const METRIC_REQUESTS: &str = "kmlmap_requests_total";
const METRIC_RENDER_MS: &str = "kmlmap_render_ms";

/// Attachment name used when a KMZ response covers more than one layer.
const DEFAULT_ARCHIVE_STEM: &str = "wms";

#[derive(Debug, Clone)]
pub struct MapServiceConfig {
    /// Prefix of overlay and pagination hrefs.
    pub base_url: String,
    pub overlay_format: String,
    pub defaults: FormatDefaults,
    pub max_features: Option<u64>,
}

impl Default for MapServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/geoserver/".to_string(),
            overlay_format: "image/png".to_string(),
            defaults: FormatDefaults::default(),
            max_features: None,
        }
    }
}

/// Overlay image that has to be fetched and stored in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayImage {
    /// Archive path the overlays reference.
    pub entry: String,
    /// Secondary request producing the image.
    pub href: String,
    pub layers: Vec<QualifiedName>,
}

/// Composed but not yet serialized response.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMap {
    pub document: Document,
    pub images: Vec<OverlayImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOutput {
    pub mime_type: &'static str,
    pub content_disposition: Option<String>,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct KmlMapService {
    assembler: LayerFolderAssembler,
    overlays: OverlayUrlBuilder,
    renderer: Arc<dyn OverlayRenderer>,
    packager: ArchivePackager,
    defaults: FormatDefaults,
}

impl KmlMapService {
    pub fn new(
        catalog: Arc<dyn LayerCatalog>,
        features: Arc<dyn FeatureSource>,
        styles: Arc<dyn StyleResolver>,
        renderer: Arc<dyn OverlayRenderer>,
        config: MapServiceConfig,
    ) -> Self {
        let assembler = LayerFolderAssembler::new(
            catalog,
            features,
            styles,
            PaginationLinkBuilder::new(&config.base_url),
        )
        .with_max_features(config.max_features);
        Self {
            assembler,
            overlays: OverlayUrlBuilder::new(&config.base_url, config.overlay_format),
            renderer,
            packager: ArchivePackager::default(),
            defaults: config.defaults,
        }
    }

    pub fn with_remote_features(mut self, remote: Arc<dyn FeatureSource>) -> Self {
        self.assembler = self.assembler.with_remote_features(remote);
        self
    }

    /// Parse a raw KVP query and render it.
    pub fn render_query(&self, query: &str) -> Result<MapOutput, MapError> {
        let request = RenderRequest::from_query(query)?;
        self.render(&request)
    }

    pub fn render(&self, request: &RenderRequest) -> Result<MapOutput, MapError> {
        let started_at = Instant::now();
        let rendered = self.compose(request)?;
        let kml = encode_document(&rendered.document)?;

        let output = if request.format.is_archive() {
            let images = rendered
                .images
                .iter()
                .map(|image| {
                    self.renderer
                        .render(&image.href)
                        .map_err(|source| MapError::OverlayRender {
                            layers: join_names(&image.layers),
                            source,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let body = self.packager.package(kml.as_bytes(), &images)?;
            MapOutput {
                mime_type: request.format.mime_type(),
                content_disposition: Some(attachment_header(request)),
                body,
            }
        } else {
            MapOutput {
                mime_type: request.format.mime_type(),
                content_disposition: None,
                body: Bytes::from(kml),
            }
        };

        counter!(METRIC_REQUESTS, "format" => request.format.extension()).increment(1);
        histogram!(METRIC_RENDER_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(
            target = "application::service::KmlMapService",
            layers = request.layers.len(),
            format = request.format.extension(),
            images = rendered.images.len(),
            bytes = output.body.len(),
            "map rendered"
        );
        Ok(output)
    }

    /// Resolve, assemble and compose the document without serializing it.
    ///
    /// In archive mode overlays reference images inside the archive. Adjacent
    /// overlay layers share one combined image request, so each run of them
    /// adds one entry to [`RenderedMap::images`].
    pub fn compose(&self, request: &RenderRequest) -> Result<RenderedMap, MapError> {
        let options = FormatOptions::from_raw(&request.format_options, self.defaults);
        let plans = self.assembler.plan_all(request, &options)?;
        let mut composer = DocumentComposer::new(options.title.clone(), plans.len());
        let mut images = Vec::new();

        let archive = request.format.is_archive();
        let mut index = 0;
        while index < plans.len() {
            let plan = &plans[index];
            if !plan.is_overlay() {
                let folder = self.assembler.assemble(request, plan, &options, "")?;
                composer.insert(plan.index, folder)?;
                index += 1;
                continue;
            }

            let run_end = if archive {
                plans[index..]
                    .iter()
                    .position(|next| !next.is_overlay())
                    .map_or(plans.len(), |offset| index + offset)
            } else {
                index + 1
            };
            let run = &plans[index..run_end];
            let href = self.overlays.href(request, &overlay_layers(run));
            let target = if archive {
                let entry = image_entry(images.len());
                debug!(
                    target = "application::service::KmlMapService",
                    entry = %entry,
                    layers = run.len(),
                    "grouped overlay image"
                );
                images.push(OverlayImage {
                    entry: entry.clone(),
                    href,
                    layers: run.iter().map(|plan| plan.layer.name.clone()).collect(),
                });
                entry
            } else {
                href
            };
            for plan in run {
                let folder = self.assembler.assemble(request, plan, &options, &target)?;
                composer.insert(plan.index, folder)?;
            }
            index = run_end;
        }

        Ok(RenderedMap {
            document: composer.finish()?,
            images,
        })
    }
}

fn overlay_layers(plans: &[LayerPlan]) -> Vec<OverlayLayer> {
    plans.iter().map(LayerPlan::overlay_layer).collect()
}

fn join_names(names: &[QualifiedName]) -> String {
    names
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn attachment_header(request: &RenderRequest) -> String {
    let stem = request
        .single_layer()
        .map(|layer| layer.name.file_stem())
        .unwrap_or_else(|| DEFAULT_ARCHIVE_STEM.to_string());
    format!("attachment; filename={stem}.{}", request.format.extension())
}
