//! Feature source backed by a remote WFS returning GeoJSON.

use reqwest::blocking::Client;
use tracing::warn;
use url::Url;

use crate::application::repos::{FeatureQuery, FeatureSource, FeatureStream, RepoError};
use crate::domain::entities::LayerSource;
use crate::infra::client::fetch;
use crate::infra::geojson::FeatureCollectionRecord;

const OUTPUT_FORMAT: &str = "application/json";

#[derive(Debug, Clone)]
pub struct WfsFeatureSource {
    client: Client,
}

impl WfsFeatureSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// GetFeature request for the layer, bbox and id filter of `query`.
pub fn get_feature_url(query: &FeatureQuery<'_>) -> Result<Url, RepoError> {
    let LayerSource::Remote(remote) = &query.layer.source else {
        return Err(RepoError::InvalidInput {
            message: format!("layer `{}` is not a remote layer", query.layer.name),
        });
    };
    let mut url = Url::parse(&remote.url).map_err(|err| RepoError::InvalidInput {
        message: format!("remote url `{}`: {err}", remote.url),
    })?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("service", "WFS")
            .append_pair("version", "1.0.0")
            .append_pair("request", "GetFeature")
            .append_pair("typeName", &query.layer.name.to_string())
            .append_pair("outputFormat", OUTPUT_FORMAT)
            .append_pair("bbox", &query.bbox.to_param());
        if !query.feature_ids.is_empty() {
            pairs.append_pair("featureID", &query.feature_ids.join(","));
        }
        if let Some(filter) = query.filter {
            pairs.append_pair("CQL_FILTER", filter);
        }
    }
    Ok(url)
}

impl FeatureSource for WfsFeatureSource {
    fn features(&self, query: &FeatureQuery<'_>) -> Result<FeatureStream, RepoError> {
        let url = get_feature_url(query)?;
        let body = fetch(&self.client, url.as_str())?;
        let collection: FeatureCollectionRecord = serde_json::from_slice(&body)
            .map_err(|err| RepoError::unavailable(url.as_str(), format!("invalid GeoJSON: {err}")))?;

        let layer = query.layer.name.local().to_string();
        let mut features = Vec::with_capacity(collection.features.len());
        for (index, record) in collection.features.into_iter().enumerate() {
            match record.into_feature(|| format!("{layer}.{}", index + 1)) {
                Ok(Some(feature)) => features.push(feature),
                Ok(None) => {}
                Err(err) => warn!(
                    target = "infra::remote::WfsFeatureSource",
                    layer = %query.layer.name,
                    index,
                    error = %err,
                    "skipping remote feature with unusable geometry"
                ),
            }
        }
        Ok(Box::new(features.into_iter()))
    }

    fn count(&self, query: &FeatureQuery<'_>) -> Result<u64, RepoError> {
        Ok(self.features(query)?.count() as u64)
    }
}
