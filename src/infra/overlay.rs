use bytes::Bytes;
use reqwest::blocking::Client;

use crate::application::repos::{OverlayRenderer, RepoError};
use crate::infra::client::fetch;

/// Fetches overlay images by issuing the secondary GetMap request over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOverlayRenderer {
    client: Client,
}

impl HttpOverlayRenderer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl OverlayRenderer for HttpOverlayRenderer {
    fn render(&self, href: &str) -> Result<Bytes, RepoError> {
        let image = fetch(&self.client, href)?;
        if image.is_empty() {
            return Err(RepoError::unavailable(href, "empty image response"));
        }
        Ok(image)
    }
}
